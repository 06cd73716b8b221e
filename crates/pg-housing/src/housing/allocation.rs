//! Allocation engine: the tenant↔room binding and the room status derived from it.
//!
//! Every function runs inside a caller-owned transaction and only stages
//! writes; nothing is visible until the caller commits. Room status is written
//! by [`settle_room`] alone, which recomputes it from allocation existence.

use chrono::{DateTime, Utc};

use super::domain::{Allocation, AllocationId, Person, PersonId, Role, Room, RoomId, RoomStatus};
use super::error::HousingError;
use super::store::StoreTransaction;

/// Operator intent about the maintenance hold when settling a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MaintenanceHold {
    Keep,
    Begin,
    End,
}

/// Approve a pending tenant and bind them to a vacant room in one step.
pub fn approve_and_allocate<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    room_id: RoomId,
    now: DateTime<Utc>,
) -> Result<Allocation, HousingError> {
    let mut tenant = lock_tenant(tx, tenant_id)?;
    let room = lock_room(tx, room_id)?;

    if tenant.approved {
        return Err(HousingError::InvalidState(format!(
            "tenant {tenant_id} is already approved"
        )));
    }
    require_vacant(&room)?;
    if let Some(open) = open_allocation_for_tenant(tx, tenant_id)? {
        return Err(HousingError::Conflict(format!(
            "tenant {tenant_id} already holds allocation {}",
            open.id
        )));
    }

    tenant.approved = true;
    tx.put(tenant)?;
    bind(tx, tenant_id, room, now)
}

/// Direct admin allotment, independent of the approval flag.
pub fn allocate_existing<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    room_id: RoomId,
    now: DateTime<Utc>,
) -> Result<Allocation, HousingError> {
    lock_tenant(tx, tenant_id)?;
    if let Some(open) = open_allocation_for_tenant(tx, tenant_id)? {
        return Err(HousingError::Conflict(format!(
            "tenant {tenant_id} already holds allocation {}",
            open.id
        )));
    }

    let room = lock_room(tx, room_id)?;
    require_vacant(&room)?;
    bind(tx, tenant_id, room, now)
}

/// Close an open allocation and free its room.
pub fn deallocate<T: StoreTransaction>(
    tx: &mut T,
    allocation_id: AllocationId,
    now: DateTime<Utc>,
) -> Result<Allocation, HousingError> {
    let mut allocation = tx
        .fetch_for_update::<Allocation>(allocation_id)?
        .filter(Allocation::is_open)
        .ok_or_else(|| HousingError::not_found("open allocation", allocation_id))?;

    allocation.check_out = Some(now);
    tx.put(allocation.clone())?;

    let room = lock_room(tx, allocation.room_id)?;
    settle_room(tx, room, MaintenanceHold::Keep)?;
    Ok(allocation)
}

pub fn begin_maintenance<T: StoreTransaction>(
    tx: &mut T,
    room_id: RoomId,
) -> Result<Room, HousingError> {
    let room = lock_room(tx, room_id)?;
    match room.status {
        RoomStatus::Vacant => settle_room(tx, room, MaintenanceHold::Begin),
        RoomStatus::Occupied | RoomStatus::Maintenance => Err(HousingError::InvalidState(
            format!("room {} is {}", room.room_number, room.status.label()),
        )),
    }
}

pub fn end_maintenance<T: StoreTransaction>(
    tx: &mut T,
    room_id: RoomId,
) -> Result<Room, HousingError> {
    let room = lock_room(tx, room_id)?;
    match room.status {
        RoomStatus::Maintenance => settle_room(tx, room, MaintenanceHold::End),
        RoomStatus::Vacant | RoomStatus::Occupied => Err(HousingError::InvalidState(format!(
            "room {} is not under maintenance",
            room.room_number
        ))),
    }
}

pub fn open_allocation_for_tenant<T: StoreTransaction>(
    tx: &T,
    tenant_id: PersonId,
) -> Result<Option<Allocation>, HousingError> {
    Ok(tx
        .scan::<Allocation>()?
        .into_iter()
        .find(|allocation| allocation.is_open() && allocation.tenant_id == tenant_id))
}

pub fn open_allocation_for_room<T: StoreTransaction>(
    tx: &T,
    room_id: RoomId,
) -> Result<Option<Allocation>, HousingError> {
    Ok(tx
        .scan::<Allocation>()?
        .into_iter()
        .find(|allocation| allocation.is_open() && allocation.room_id == room_id))
}

/// The only writer of `Room::status`.
///
/// Occupied exactly when an open allocation references the room; otherwise
/// vacant unless a maintenance hold is in place or being placed.
pub(crate) fn settle_room<T: StoreTransaction>(
    tx: &mut T,
    mut room: Room,
    hold: MaintenanceHold,
) -> Result<Room, HousingError> {
    let occupied = open_allocation_for_room(tx, room.id)?.is_some();
    let status = match (occupied, hold) {
        (true, MaintenanceHold::Begin) => {
            return Err(HousingError::InvalidState(format!(
                "room {} is occupied",
                room.room_number
            )))
        }
        (true, _) => RoomStatus::Occupied,
        (false, MaintenanceHold::Begin) => RoomStatus::Maintenance,
        (false, MaintenanceHold::End) => RoomStatus::Vacant,
        (false, MaintenanceHold::Keep) => match room.status {
            RoomStatus::Maintenance => RoomStatus::Maintenance,
            RoomStatus::Vacant | RoomStatus::Occupied => RoomStatus::Vacant,
        },
    };

    room.status = status;
    tx.put(room.clone())?;
    Ok(room)
}

fn bind<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    room: Room,
    now: DateTime<Utc>,
) -> Result<Allocation, HousingError> {
    let allocation = tx.insert::<Allocation, _>(|id| Allocation {
        id,
        tenant_id,
        room_id: room.id,
        monthly_rent: room.monthly_rent,
        check_in: now,
        check_out: None,
    })?;
    settle_room(tx, room, MaintenanceHold::Keep)?;
    Ok(allocation)
}

fn lock_tenant<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
) -> Result<Person, HousingError> {
    let person = tx
        .fetch_for_update::<Person>(tenant_id)?
        .ok_or_else(|| HousingError::not_found("tenant", tenant_id))?;
    match person.role {
        Role::Tenant => Ok(person),
        Role::Admin | Role::ServiceAgent => Err(HousingError::InvalidState(format!(
            "person {tenant_id} is a {}, not a tenant",
            person.role.label()
        ))),
    }
}

fn lock_room<T: StoreTransaction>(tx: &mut T, room_id: RoomId) -> Result<Room, HousingError> {
    tx.fetch_for_update::<Room>(room_id)?
        .ok_or_else(|| HousingError::not_found("room", room_id))
}

fn require_vacant(room: &Room) -> Result<(), HousingError> {
    match room.status {
        RoomStatus::Vacant => Ok(()),
        RoomStatus::Occupied | RoomStatus::Maintenance => Err(HousingError::InvalidState(
            format!("room {} is {}", room.room_number, room.status.label()),
        )),
    }
}
