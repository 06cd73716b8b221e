//! Entity Store seam.
//!
//! State machines never touch storage directly: they run against a
//! [`StoreTransaction`] obtained from a [`HousingStore`], stage their reads and
//! writes there, and the caller commits the transaction as one unit. Dropping a
//! transaction without committing discards everything it staged.

pub mod memory;

use std::fmt;

use super::domain::{
    Allocation, AllocationId, Complaint, ComplaintId, Payment, PaymentId, Person, PersonId, Room,
    RoomId,
};

pub use memory::{MemoryStore, MemoryTransaction};

/// The five relations held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Persons,
    Rooms,
    Allocations,
    Complaints,
    Payments,
}

impl Table {
    pub(crate) const COUNT: usize = 5;

    pub const ALL: [Table; Table::COUNT] = [
        Table::Persons,
        Table::Rooms,
        Table::Allocations,
        Table::Complaints,
        Table::Payments,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Table::Persons => "persons",
            Table::Rooms => "rooms",
            Table::Allocations => "allocations",
            Table::Complaints => "complaints",
            Table::Payments => "payments",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Table::Persons => 0,
            Table::Rooms => 1,
            Table::Allocations => 2,
            Table::Complaints => 3,
            Table::Payments => 4,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primary key of a row across all tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub table: Table,
    pub id: u64,
}

/// Type-erased row as held by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Person(Person),
    Room(Room),
    Allocation(Allocation),
    Complaint(Complaint),
    Payment(Payment),
}

pub(crate) const PERSON_EMAIL: &str = "persons_email_unique";
pub(crate) const ROOM_NUMBER: &str = "rooms_number_unique";
pub(crate) const OPEN_ALLOCATION_PER_TENANT: &str = "allocations_open_tenant_unique";
pub(crate) const OPEN_ALLOCATION_PER_ROOM: &str = "allocations_open_room_unique";

/// Value a row claims under a uniqueness constraint of its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub constraint: &'static str,
    pub value: String,
}

impl UniqueKey {
    fn new(constraint: &'static str, value: impl Into<String>) -> Self {
        Self {
            constraint,
            value: value.into(),
        }
    }
}

impl Row {
    /// Keys no other row of the same table may hold at commit time.
    /// Emails and room numbers compare case-insensitively; closed
    /// allocations claim nothing.
    pub fn unique_keys(&self) -> Vec<UniqueKey> {
        match self {
            Row::Person(person) => {
                vec![UniqueKey::new(PERSON_EMAIL, person.email.to_ascii_lowercase())]
            }
            Row::Room(room) => vec![UniqueKey::new(
                ROOM_NUMBER,
                room.room_number.trim().to_ascii_lowercase(),
            )],
            Row::Allocation(allocation) if allocation.is_open() => vec![
                UniqueKey::new(OPEN_ALLOCATION_PER_TENANT, allocation.tenant_id.to_string()),
                UniqueKey::new(OPEN_ALLOCATION_PER_ROOM, allocation.room_id.to_string()),
            ],
            Row::Allocation(_) | Row::Complaint(_) | Row::Payment(_) => Vec::new(),
        }
    }
}

/// An entity that lives in exactly one table of the store.
pub trait Record: Clone + Send + Sync + Sized + 'static {
    type Id: Copy + From<u64> + Into<u64>;
    const TABLE: Table;

    fn id(&self) -> Self::Id;
    fn into_row(self) -> Row;
    fn from_row(row: &Row) -> Option<Self>;

    /// Name of a write-once field that differs from `previous`, if any.
    fn changed_immutable_field(&self, _previous: &Self) -> Option<&'static str> {
        None
    }

    fn key(&self) -> RowKey {
        RowKey {
            table: Self::TABLE,
            id: self.id().into(),
        }
    }
}

macro_rules! record {
    ($entity:ident, $id:ident, $table:expr) => {
        impl Record for $entity {
            type Id = $id;
            const TABLE: Table = $table;

            fn id(&self) -> Self::Id {
                self.id
            }

            fn into_row(self) -> Row {
                Row::$entity(self)
            }

            fn from_row(row: &Row) -> Option<Self> {
                match row {
                    Row::$entity(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

record!(Person, PersonId, Table::Persons);
record!(Room, RoomId, Table::Rooms);
record!(Allocation, AllocationId, Table::Allocations);
record!(Complaint, ComplaintId, Table::Complaints);

impl Record for Payment {
    type Id = PaymentId;
    const TABLE: Table = Table::Payments;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn into_row(self) -> Row {
        Row::Payment(self)
    }

    fn from_row(row: &Row) -> Option<Self> {
        match row {
            Row::Payment(inner) => Some(inner.clone()),
            _ => None,
        }
    }

    fn changed_immutable_field(&self, previous: &Self) -> Option<&'static str> {
        if self.tenant_id != previous.tenant_id {
            Some("tenant_id")
        } else if self.amount != previous.amount {
            Some("amount")
        } else if self.period != previous.period {
            Some("period")
        } else {
            None
        }
    }
}

/// Unit of work against the store.
pub trait StoreTransaction {
    /// Plain read from the transaction's snapshot, including its own staged writes.
    fn fetch<R: Record>(&self, id: R::Id) -> Result<Option<R>, StoreError>;

    /// Read that also locks the row: the commit fails with
    /// [`StoreError::Conflict`] if another transaction changes it first.
    fn fetch_for_update<R: Record>(&mut self, id: R::Id) -> Result<Option<R>, StoreError>;

    /// All rows of a table, ordered by identifier.
    fn scan<R: Record>(&self) -> Result<Vec<R>, StoreError>;

    fn next_id<R: Record>(&mut self) -> Result<R::Id, StoreError>;

    /// Stage an insert or update of `record`.
    fn put<R: Record>(&mut self, record: R) -> Result<(), StoreError>;

    fn insert<R, F>(&mut self, build: F) -> Result<R, StoreError>
    where
        R: Record,
        F: FnOnce(R::Id) -> R,
    {
        let id = self.next_id::<R>()?;
        let record = build(id);
        self.put(record.clone())?;
        Ok(record)
    }
}

/// Transactional access to the persisted relations.
pub trait HousingStore: Send + Sync {
    type Tx: StoreTransaction + Send;

    fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Atomically publish every write staged in `tx`, or nothing.
    fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{table} row {id} was modified by a concurrent transaction")]
    Conflict { table: Table, id: u64 },
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: &'static str },
    #[error("{table} row {id}: field {field} is immutable")]
    ImmutableField {
        table: Table,
        id: u64,
        field: &'static str,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
