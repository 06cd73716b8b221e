use super::domain::ComplaintStatus;
use super::store::StoreError;

/// Failure taxonomy shared by the allocation, triage and ledger state machines.
#[derive(Debug, thiserror::Error)]
pub enum HousingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("complaint cannot move from {from} to {to}")]
    InvalidTransition {
        from: ComplaintStatus,
        to: ComplaintStatus,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(StoreError),
}

impl HousingError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable snake_case name of the variant, used in API error bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            HousingError::NotFound { .. } => "not_found",
            HousingError::InvalidState(_) => "invalid_state",
            HousingError::Conflict(_) => "conflict",
            HousingError::InvalidTransition { .. } => "invalid_transition",
            HousingError::Forbidden(_) => "forbidden",
            HousingError::Validation(_) => "validation",
            HousingError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for HousingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } | StoreError::UniqueViolation { .. } => {
                HousingError::Conflict(err.to_string())
            }
            other => HousingError::Store(other),
        }
    }
}
