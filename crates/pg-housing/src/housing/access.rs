//! Role-scoped authorization checks consumed by every state machine.

use serde::{Deserialize, Serialize};

use super::domain::{Complaint, Payment, PersonId, Role};
use super::error::HousingError;

/// Authenticated caller as resolved from the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PersonId,
    pub role: Role,
}

impl Principal {
    pub const fn new(id: PersonId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn require_admin(&self, action: &str) -> Result<(), HousingError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Tenant | Role::ServiceAgent => Err(self.denied(action)),
        }
    }

    pub fn require_tenant(&self, action: &str) -> Result<(), HousingError> {
        match self.role {
            Role::Tenant => Ok(()),
            Role::Admin | Role::ServiceAgent => Err(self.denied(action)),
        }
    }

    pub fn can_read_complaint(&self, complaint: &Complaint) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Tenant => complaint.tenant_id == self.id,
            Role::ServiceAgent => complaint.agent_id == Some(self.id),
        }
    }

    /// Admins may move any complaint forward; agents only the ones they hold.
    pub fn can_work_complaint(&self, complaint: &Complaint) -> bool {
        match self.role {
            Role::Admin => true,
            Role::ServiceAgent => complaint.agent_id == Some(self.id),
            Role::Tenant => false,
        }
    }

    pub fn can_read_payment(&self, payment: &Payment) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Tenant => payment.tenant_id == self.id,
            Role::ServiceAgent => false,
        }
    }

    pub(crate) fn denied(&self, action: &str) -> HousingError {
        HousingError::Forbidden(format!(
            "{} {} may not {action}",
            self.role.label(),
            self.id
        ))
    }
}
