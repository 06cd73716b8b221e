use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{HousingStore, Record, Row, RowKey, StoreError, StoreTransaction, Table};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    row: Row,
}

type Rows = BTreeMap<RowKey, Versioned>;

#[derive(Debug)]
struct Inner {
    committed: Mutex<Arc<Rows>>,
    sequences: [AtomicU64; Table::COUNT],
}

/// In-process store with snapshot reads and optimistic row locks.
///
/// Each transaction reads from the committed map as it was at `begin`. Rows
/// fetched for update or written are pinned to the version seen; `commit`
/// rejects the transaction if any pinned row moved, then checks every written
/// row's [`Row::unique_keys`] against its table before swapping the new map in.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: Mutex::new(Arc::new(Rows::new())),
                sequences: std::array::from_fn(|_| AtomicU64::new(1)),
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn committed(&self) -> Result<std::sync::MutexGuard<'_, Arc<Rows>>, StoreError> {
        self.inner
            .committed
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl HousingStore for MemoryStore {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Result<Self::Tx, StoreError> {
        let snapshot = Arc::clone(&*self.committed()?);
        Ok(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            snapshot,
            pinned: BTreeMap::new(),
            writes: BTreeMap::new(),
        })
    }

    fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        if !Arc::ptr_eq(&self.inner, &tx.inner) {
            return Err(StoreError::Unavailable(
                "transaction belongs to another store".to_string(),
            ));
        }
        if tx.writes.is_empty() {
            return Ok(());
        }

        let mut committed = self.committed()?;

        for (key, seen) in &tx.pinned {
            let current = committed.get(key).map(|entry| entry.version);
            if current != *seen {
                debug!(table = %key.table, id = key.id, ?seen, ?current, "row lock lost");
                return Err(StoreError::Conflict {
                    table: key.table,
                    id: key.id,
                });
            }
        }

        let mut next: Rows = (**committed).clone();
        for (key, row) in &tx.writes {
            let version = next.get(key).map_or(1, |entry| entry.version + 1);
            next.insert(
                *key,
                Versioned {
                    version,
                    row: row.clone(),
                },
            );
        }

        check_unique_keys(&next, &tx.writes)?;

        *committed = Arc::new(next);
        Ok(())
    }
}

fn check_unique_keys(rows: &Rows, writes: &BTreeMap<RowKey, Row>) -> Result<(), StoreError> {
    for (key, row) in writes {
        let claimed = row.unique_keys();
        if claimed.is_empty() {
            continue;
        }
        let clash = table_range(rows, key.table)
            .filter(|(other, _)| *other != key)
            .flat_map(|(_, entry)| entry.row.unique_keys())
            .find(|held| claimed.contains(held));
        if let Some(held) = clash {
            debug!(
                table = %key.table,
                id = key.id,
                constraint = held.constraint,
                "unique key taken"
            );
            return Err(StoreError::UniqueViolation {
                constraint: held.constraint,
            });
        }
    }
    Ok(())
}

fn table_range(rows: &Rows, table: Table) -> impl Iterator<Item = (&RowKey, &Versioned)> {
    rows.range(RowKey { table, id: 0 }..=RowKey { table, id: u64::MAX })
}

/// Transaction handed out by [`MemoryStore::begin`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    snapshot: Arc<Rows>,
    pinned: BTreeMap<RowKey, Option<u64>>,
    writes: BTreeMap<RowKey, Row>,
}

impl MemoryTransaction {
    fn visible(&self, key: &RowKey) -> Option<&Row> {
        self.writes
            .get(key)
            .or_else(|| self.snapshot.get(key).map(|entry| &entry.row))
    }

    fn pin(&mut self, key: RowKey) {
        let seen = self.snapshot.get(&key).map(|entry| entry.version);
        self.pinned.entry(key).or_insert(seen);
    }
}

impl StoreTransaction for MemoryTransaction {
    fn fetch<R: Record>(&self, id: R::Id) -> Result<Option<R>, StoreError> {
        let key = RowKey {
            table: R::TABLE,
            id: id.into(),
        };
        Ok(self.visible(&key).and_then(R::from_row))
    }

    fn fetch_for_update<R: Record>(&mut self, id: R::Id) -> Result<Option<R>, StoreError> {
        let key = RowKey {
            table: R::TABLE,
            id: id.into(),
        };
        self.pin(key);
        Ok(self.visible(&key).and_then(R::from_row))
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let mut merged: BTreeMap<u64, &Row> = table_range(&self.snapshot, R::TABLE)
            .map(|(key, entry)| (key.id, &entry.row))
            .collect();
        let staged = self.writes.range(
            RowKey {
                table: R::TABLE,
                id: 0,
            }..=RowKey {
                table: R::TABLE,
                id: u64::MAX,
            },
        );
        for (key, row) in staged {
            merged.insert(key.id, row);
        }
        Ok(merged.into_values().filter_map(R::from_row).collect())
    }

    fn next_id<R: Record>(&mut self) -> Result<R::Id, StoreError> {
        let id = self.inner.sequences[R::TABLE.index()].fetch_add(1, Ordering::Relaxed);
        Ok(R::Id::from(id))
    }

    fn put<R: Record>(&mut self, record: R) -> Result<(), StoreError> {
        let key = record.key();
        if let Some(previous) = self.visible(&key).and_then(R::from_row) {
            if let Some(field) = record.changed_immutable_field(&previous) {
                return Err(StoreError::ImmutableField {
                    table: key.table,
                    id: key.id,
                    field,
                });
            }
        }
        self.pin(key);
        self.writes.insert(key, record.into_row());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::housing::domain::{
        Allocation, Payment, PaymentId, PaymentStatus, Person, PersonId, Role, Room, RoomId,
        RoomStatus,
    };
    use crate::housing::store::{
        OPEN_ALLOCATION_PER_ROOM, OPEN_ALLOCATION_PER_TENANT, PERSON_EMAIL, ROOM_NUMBER,
    };
    use chrono::{TimeZone, Utc};

    fn room(id: RoomId) -> Room {
        Room {
            id,
            room_number: format!("R-{id}"),
            floor: 1,
            capacity: 1,
            monthly_rent: 6500,
            status: RoomStatus::Vacant,
        }
    }

    fn allocation(id: u64, tenant: u64, room: u64) -> Allocation {
        Allocation {
            id: id.into(),
            tenant_id: PersonId(tenant),
            room_id: RoomId(room),
            monthly_rent: 6500,
            check_in: Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap(),
            check_out: None,
        }
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().expect("begin");
            tx.insert::<Room, _>(room).expect("insert");
        }

        let tx = store.begin().expect("begin");
        assert!(tx.scan::<Room>().expect("scan").is_empty());
    }

    #[test]
    fn staged_writes_are_visible_inside_the_transaction_only() {
        let store = MemoryStore::new();
        let mut writer = store.begin().expect("begin");
        let stored = writer.insert::<Room, _>(room).expect("insert");
        let reader = store.begin().expect("begin");

        assert_eq!(
            writer.fetch::<Room>(stored.id).expect("fetch"),
            Some(stored.clone())
        );
        assert_eq!(reader.fetch::<Room>(stored.id).expect("fetch"), None);

        store.commit(writer).expect("commit");
        assert_eq!(reader.fetch::<Room>(stored.id).expect("fetch"), None);
        let fresh = store.begin().expect("begin");
        assert_eq!(fresh.fetch::<Room>(stored.id).expect("fetch"), Some(stored));
    }

    #[test]
    fn commit_rejects_when_a_locked_row_moved() {
        let store = MemoryStore::new();
        let mut seed = store.begin().expect("begin");
        let stored = seed.insert::<Room, _>(room).expect("insert");
        store.commit(seed).expect("commit");

        let mut first = store.begin().expect("begin");
        let mut second = store.begin().expect("begin");
        let mut a = first
            .fetch_for_update::<Room>(stored.id)
            .expect("fetch")
            .expect("row");
        let mut b = second
            .fetch_for_update::<Room>(stored.id)
            .expect("fetch")
            .expect("row");
        a.status = RoomStatus::Occupied;
        b.status = RoomStatus::Maintenance;
        first.put(a).expect("stage");
        second.put(b).expect("stage");

        store.commit(first).expect("first commit wins");
        match store.commit(second) {
            Err(StoreError::Conflict { table, id }) => {
                assert_eq!(table, Table::Rooms);
                assert_eq!(id, stored.id.0);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn commit_enforces_one_open_allocation_per_room() {
        let store = MemoryStore::new();
        let mut first = store.begin().expect("begin");
        first.put(allocation(1, 10, 5)).expect("stage");
        store.commit(first).expect("commit");

        let mut second = store.begin().expect("begin");
        second.put(allocation(2, 11, 5)).expect("stage");
        assert_eq!(
            store.commit(second),
            Err(StoreError::UniqueViolation {
                constraint: OPEN_ALLOCATION_PER_ROOM
            })
        );

        let mut third = store.begin().expect("begin");
        third.put(allocation(3, 10, 6)).expect("stage");
        assert_eq!(
            store.commit(third),
            Err(StoreError::UniqueViolation {
                constraint: OPEN_ALLOCATION_PER_TENANT
            })
        );
    }

    fn person(email: &str) -> impl FnOnce(PersonId) -> Person + '_ {
        move |id| Person {
            id,
            email: email.to_string(),
            full_name: None,
            role: Role::Tenant,
            approved: false,
            specialty: None,
            availability: None,
            created_at: Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn concurrent_inserts_cannot_share_an_email() {
        let store = MemoryStore::new();
        let mut first = store.begin().expect("begin");
        let mut second = store.begin().expect("begin");
        first
            .insert::<Person, _>(person("x@example.com"))
            .expect("stage");
        second
            .insert::<Person, _>(person("X@Example.com"))
            .expect("stage");

        store.commit(first).expect("first commit wins");
        assert_eq!(
            store.commit(second),
            Err(StoreError::UniqueViolation {
                constraint: PERSON_EMAIL
            })
        );
        let tx = store.begin().expect("begin");
        assert_eq!(tx.scan::<Person>().expect("scan").len(), 1);
    }

    #[test]
    fn room_numbers_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        let mut seed = store.begin().expect("begin");
        let mut stored = seed.insert::<Room, _>(room).expect("insert");
        store.commit(seed).expect("commit");

        let mut clash = store.begin().expect("begin");
        let number = stored.room_number.to_ascii_lowercase();
        clash
            .insert::<Room, _>(|id| Room {
                room_number: number,
                ..room(id)
            })
            .expect("stage");
        assert_eq!(
            store.commit(clash),
            Err(StoreError::UniqueViolation {
                constraint: ROOM_NUMBER
            })
        );

        let mut update = store.begin().expect("begin");
        stored.status = RoomStatus::Maintenance;
        update.put(stored).expect("stage");
        store
            .commit(update)
            .expect("rewriting a row keeps its own keys");
    }

    #[test]
    fn closed_allocations_release_their_keys() {
        let store = MemoryStore::new();
        let mut first = store.begin().expect("begin");
        let mut closed = allocation(1, 10, 5);
        closed.check_out = Some(Utc.with_ymd_and_hms(2025, 11, 1, 9, 0, 0).unwrap());
        first.put(closed).expect("stage");
        store.commit(first).expect("commit");

        let mut second = store.begin().expect("begin");
        second.put(allocation(2, 10, 5)).expect("stage");
        store
            .commit(second)
            .expect("same tenant and room may reopen after check-out");
    }

    #[test]
    fn payment_amount_cannot_be_rewritten() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        let payment = tx
            .insert::<Payment, _>(|id: PaymentId| Payment {
                id,
                tenant_id: PersonId(3),
                amount: 6500,
                period: "October 2025".to_string(),
                transaction_ref: None,
                status: PaymentStatus::Pending,
                submitted_at: Utc.with_ymd_and_hms(2025, 10, 2, 9, 0, 0).unwrap(),
            })
            .expect("insert");
        store.commit(tx).expect("commit");

        let mut tx = store.begin().expect("begin");
        let mut edited = payment.clone();
        edited.amount = 1;
        assert!(matches!(
            tx.put(edited),
            Err(StoreError::ImmutableField {
                field: "amount",
                ..
            })
        ));

        let mut approved = payment;
        approved.status = PaymentStatus::Paid;
        tx.put(approved).expect("status change is allowed");
    }
}
