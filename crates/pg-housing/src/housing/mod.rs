//! Allocation and lifecycle consistency engine for paying-guest housing.
//!
//! Three state machines share one transactional store: the allocation engine
//! (tenant↔room binding and derived room status), complaint triage, and the
//! payment ledger. [`HousingService`] is the entry point used by the HTTP
//! layer; it applies the access policy and runs each action as a single
//! transaction.

pub mod access;
pub mod allocation;
pub mod complaints;
pub mod consistency;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::Principal;
pub use consistency::{ConsistencyReport, Violation};
pub use domain::{
    Allocation, AllocationId, AvailabilityStatus, Complaint, ComplaintId, ComplaintStatus,
    NewComplaint, NewPerson, NewRoom, Payment, PaymentId, PaymentStatus, PaymentSubmission, Person,
    PersonId, Role, Room, RoomId, RoomStatus, ServiceCategory,
};
pub use error::HousingError;
pub use router::{housing_router, PRINCIPAL_HEADER};
pub use service::{HousingService, HousingStats, PaymentView, TenancyView};
pub use store::{HousingStore, MemoryStore, StoreError, StoreTransaction};
