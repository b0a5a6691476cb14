//! Service-level error types.

use regime_domain::AllocationError;
use regime_id::{AllocationId, PrisonCode};
use thiserror::Error;

use crate::clients::ClientError;
use crate::db::DbError;

/// Errors from movement handling and explicit allocation operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The request breaks an allocation rule. Names the allocation.
    #[error("validation failed: {0}")]
    Validation(#[from] AllocationError),

    #[error("allocation {allocation_id} not found at {prison_code}")]
    NotFound {
        allocation_id: AllocationId,
        prison_code: PrisonCode,
    },

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl LifecycleError {
    /// The allocation the error concerns, when it concerns one.
    pub fn allocation_id(&self) -> Option<AllocationId> {
        match self {
            LifecycleError::Validation(e) => Some(e.allocation_id()),
            LifecycleError::NotFound { allocation_id, .. } => Some(*allocation_id),
            LifecycleError::Store(_) | LifecycleError::Client(_) => None,
        }
    }
}
