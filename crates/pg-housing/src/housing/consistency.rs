//! Cross-entity invariant audit over a store snapshot.

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{
    Allocation, Complaint, ComplaintId, ComplaintStatus, Person, PersonId, Role, Room, RoomId,
    RoomStatus,
};
use super::error::HousingError;
use super::store::StoreTransaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// Room status disagrees with allocation existence.
    RoomStatusDrift {
        room_id: RoomId,
        status: RoomStatus,
        open_allocations: usize,
    },
    TenantDoublyAllocated {
        tenant_id: PersonId,
        open_allocations: usize,
    },
    RoomDoublyAllocated {
        room_id: RoomId,
        open_allocations: usize,
    },
    AllocationToNonTenant {
        person_id: PersonId,
    },
    ComplaintWithoutAgent {
        complaint_id: ComplaintId,
        status: ComplaintStatus,
    },
    ComplaintAgentNotServiceAgent {
        complaint_id: ComplaintId,
        agent_id: PersonId,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    pub rooms_checked: usize,
    pub open_allocations: usize,
    pub complaints_checked: usize,
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn audit<T: StoreTransaction>(tx: &T) -> Result<ConsistencyReport, HousingError> {
    let persons: BTreeMap<PersonId, Person> = tx
        .scan::<Person>()?
        .into_iter()
        .map(|person| (person.id, person))
        .collect();
    let rooms = tx.scan::<Room>()?;
    let open: Vec<Allocation> = tx
        .scan::<Allocation>()?
        .into_iter()
        .filter(Allocation::is_open)
        .collect();
    let complaints = tx.scan::<Complaint>()?;

    let mut per_room: BTreeMap<RoomId, usize> = BTreeMap::new();
    let mut per_tenant: BTreeMap<PersonId, usize> = BTreeMap::new();
    for allocation in &open {
        *per_room.entry(allocation.room_id).or_default() += 1;
        *per_tenant.entry(allocation.tenant_id).or_default() += 1;
    }

    let mut violations = Vec::new();

    for room in &rooms {
        let count = per_room.get(&room.id).copied().unwrap_or(0);
        let drift = match room.status {
            RoomStatus::Occupied => count == 0,
            RoomStatus::Vacant | RoomStatus::Maintenance => count > 0,
        };
        if drift {
            violations.push(Violation::RoomStatusDrift {
                room_id: room.id,
                status: room.status,
                open_allocations: count,
            });
        }
        if count > 1 {
            violations.push(Violation::RoomDoublyAllocated {
                room_id: room.id,
                open_allocations: count,
            });
        }
    }

    for (&tenant_id, &count) in &per_tenant {
        if count > 1 {
            violations.push(Violation::TenantDoublyAllocated {
                tenant_id,
                open_allocations: count,
            });
        }
        let is_tenant = persons
            .get(&tenant_id)
            .is_some_and(|person| person.role == Role::Tenant);
        if !is_tenant {
            violations.push(Violation::AllocationToNonTenant {
                person_id: tenant_id,
            });
        }
    }

    for complaint in &complaints {
        match (complaint.status, complaint.agent_id) {
            (ComplaintStatus::Assigned | ComplaintStatus::InProgress, None) => {
                violations.push(Violation::ComplaintWithoutAgent {
                    complaint_id: complaint.id,
                    status: complaint.status,
                });
            }
            (_, Some(agent_id)) => {
                let is_agent = persons
                    .get(&agent_id)
                    .is_some_and(|person| person.role == Role::ServiceAgent);
                if !is_agent {
                    violations.push(Violation::ComplaintAgentNotServiceAgent {
                        complaint_id: complaint.id,
                        agent_id,
                    });
                }
            }
            (ComplaintStatus::Open | ComplaintStatus::Resolved, None) => {}
        }
    }

    Ok(ConsistencyReport {
        rooms_checked: rooms.len(),
        open_allocations: open.len(),
        complaints_checked: complaints.len(),
        violations,
    })
}
