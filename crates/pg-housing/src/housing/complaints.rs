//! Complaint triage: `open → assigned → in_progress → resolved`.
//!
//! Every permitted move is an explicit row in [`TRANSITIONS`]. Reassignment
//! is the one edge that may point backwards and only admins may take it.

use chrono::{DateTime, Utc};

use super::access::Principal;
use super::allocation::open_allocation_for_tenant;
use super::domain::{
    AvailabilityStatus, Complaint, ComplaintId, ComplaintStatus, NewComplaint, Person, PersonId,
    Role, Room,
};
use super::error::HousingError;
use super::store::StoreTransaction;

/// Kind of operation requesting a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageEdge {
    Assign,
    Advance,
    Reassign,
}

pub const TRANSITIONS: [(ComplaintStatus, ComplaintStatus, TriageEdge); 6] = [
    (
        ComplaintStatus::Open,
        ComplaintStatus::Assigned,
        TriageEdge::Assign,
    ),
    (
        ComplaintStatus::Assigned,
        ComplaintStatus::InProgress,
        TriageEdge::Advance,
    ),
    (
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
        TriageEdge::Advance,
    ),
    (
        ComplaintStatus::Open,
        ComplaintStatus::Assigned,
        TriageEdge::Reassign,
    ),
    (
        ComplaintStatus::Assigned,
        ComplaintStatus::Assigned,
        TriageEdge::Reassign,
    ),
    (
        ComplaintStatus::InProgress,
        ComplaintStatus::Assigned,
        TriageEdge::Reassign,
    ),
];

pub fn permits(from: ComplaintStatus, to: ComplaintStatus, edge: TriageEdge) -> bool {
    TRANSITIONS
        .iter()
        .any(|&(f, t, e)| f == from && t == to && e == edge)
}

/// Record a new complaint from the calling tenant.
pub fn create<T: StoreTransaction>(
    tx: &mut T,
    principal: &Principal,
    request: NewComplaint,
    now: DateTime<Utc>,
) -> Result<Complaint, HousingError> {
    principal.require_tenant("report complaints")?;

    let description = request.description.trim();
    if description.is_empty() {
        return Err(HousingError::Validation(
            "complaint description is required".to_string(),
        ));
    }

    if let Some(room_id) = request.room_id {
        tx.fetch::<Room>(room_id)?
            .ok_or_else(|| HousingError::not_found("room", room_id))?;
        if let Some(open) = open_allocation_for_tenant(tx, principal.id)? {
            if open.room_id != room_id {
                return Err(HousingError::Forbidden(format!(
                    "tenant {} does not occupy room {room_id}",
                    principal.id
                )));
            }
        }
    }

    let tenant_id = principal.id;
    let description = description.to_string();
    tx.insert::<Complaint, _>(|id| Complaint {
        id,
        tenant_id,
        room_id: request.room_id,
        category: request.category,
        description,
        status: ComplaintStatus::Open,
        agent_id: None,
        created_at: now,
        updated_at: now,
    })
    .map_err(HousingError::from)
}

/// Route an open complaint to a service agent.
pub fn assign<T: StoreTransaction>(
    tx: &mut T,
    principal: &Principal,
    complaint_id: ComplaintId,
    agent_id: PersonId,
    now: DateTime<Utc>,
) -> Result<Complaint, HousingError> {
    principal.require_admin("assign complaints")?;
    let mut complaint = lock_complaint(tx, complaint_id)?;
    require_agent(tx, agent_id)?;

    transition(&mut complaint, ComplaintStatus::Assigned, TriageEdge::Assign)?;
    complaint.agent_id = Some(agent_id);
    complaint.updated_at = now;
    tx.put(complaint.clone())?;
    Ok(complaint)
}

/// Move a complaint forward; only admins and the assigned agent may do so.
pub fn advance<T: StoreTransaction>(
    tx: &mut T,
    principal: &Principal,
    complaint_id: ComplaintId,
    to: ComplaintStatus,
    now: DateTime<Utc>,
) -> Result<Complaint, HousingError> {
    let mut complaint = lock_complaint(tx, complaint_id)?;
    if !principal.can_work_complaint(&complaint) {
        return Err(principal.denied(&format!("update complaint {complaint_id}")));
    }

    transition(&mut complaint, to, TriageEdge::Advance)?;
    complaint.updated_at = now;
    tx.put(complaint.clone())?;
    Ok(complaint)
}

/// Hand a non-terminal complaint to a (possibly different) agent.
pub fn reassign<T: StoreTransaction>(
    tx: &mut T,
    principal: &Principal,
    complaint_id: ComplaintId,
    agent_id: PersonId,
    now: DateTime<Utc>,
) -> Result<Complaint, HousingError> {
    principal.require_admin("reassign complaints")?;
    let mut complaint = lock_complaint(tx, complaint_id)?;
    require_agent(tx, agent_id)?;

    transition(
        &mut complaint,
        ComplaintStatus::Assigned,
        TriageEdge::Reassign,
    )?;
    complaint.agent_id = Some(agent_id);
    complaint.updated_at = now;
    tx.put(complaint.clone())?;
    Ok(complaint)
}

fn transition(
    complaint: &mut Complaint,
    to: ComplaintStatus,
    edge: TriageEdge,
) -> Result<(), HousingError> {
    if !permits(complaint.status, to, edge) {
        return Err(HousingError::InvalidTransition {
            from: complaint.status,
            to,
        });
    }
    complaint.status = to;
    Ok(())
}

fn lock_complaint<T: StoreTransaction>(
    tx: &mut T,
    complaint_id: ComplaintId,
) -> Result<Complaint, HousingError> {
    tx.fetch_for_update::<Complaint>(complaint_id)?
        .ok_or_else(|| HousingError::not_found("complaint", complaint_id))
}

/// The agent row is locked so a concurrent availability change fails the commit.
fn require_agent<T: StoreTransaction>(
    tx: &mut T,
    agent_id: PersonId,
) -> Result<Person, HousingError> {
    let agent = tx
        .fetch_for_update::<Person>(agent_id)?
        .ok_or_else(|| HousingError::not_found("service agent", agent_id))?;
    match agent.role {
        Role::ServiceAgent => {}
        Role::Admin | Role::Tenant => {
            return Err(HousingError::InvalidState(format!(
                "person {agent_id} is a {}, not a service agent",
                agent.role.label()
            )))
        }
    }
    match agent.availability {
        Some(AvailabilityStatus::Available) | None => Ok(agent),
        Some(status @ (AvailabilityStatus::Busy | AvailabilityStatus::Inactive)) => {
            Err(HousingError::InvalidState(format!(
                "service agent {agent_id} is {status} and cannot take complaints"
            )))
        }
    }
}
