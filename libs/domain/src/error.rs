//! Domain error types.

use chrono::NaiveDate;
use regime_id::{AllocationId, JobId};
use thiserror::Error;

use crate::{AllocationStatus, JobState};

/// A rejected allocation transition or request.
///
/// Every variant names the allocation it concerns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("allocation {allocation_id} has ended")]
    Ended { allocation_id: AllocationId },

    #[error("allocation {allocation_id} is already suspended")]
    AlreadySuspended { allocation_id: AllocationId },

    #[error("allocation {allocation_id} is not suspended")]
    NotSuspended { allocation_id: AllocationId },

    #[error("allocation {allocation_id} cannot be suspended from {suspend_from}, after its end date {end_date}")]
    SuspendAfterEnd {
        allocation_id: AllocationId,
        suspend_from: NaiveDate,
        end_date: NaiveDate,
    },

    #[error("allocation {allocation_id} end date {end_date} is before its start date {start_date}")]
    EndBeforeStart {
        allocation_id: AllocationId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },

    #[error("allocation {allocation_id}: {date} is in the past")]
    DateInPast {
        allocation_id: AllocationId,
        date: NaiveDate,
    },

    #[error("allocation {allocation_id} cannot move from {from} to {to}")]
    InvalidTransition {
        allocation_id: AllocationId,
        from: AllocationStatus,
        to: AllocationStatus,
    },
}

impl AllocationError {
    /// The allocation the error concerns.
    pub fn allocation_id(&self) -> AllocationId {
        match self {
            AllocationError::Ended { allocation_id }
            | AllocationError::AlreadySuspended { allocation_id }
            | AllocationError::NotSuspended { allocation_id }
            | AllocationError::SuspendAfterEnd { allocation_id, .. }
            | AllocationError::EndBeforeStart { allocation_id, .. }
            | AllocationError::DateInPast { allocation_id, .. }
            | AllocationError::InvalidTransition { allocation_id, .. } => *allocation_id,
        }
    }
}

/// A job counter operation that violates the job state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobStateError {
    #[error("job {job_id} is {state} and can no longer change")]
    Terminal { job_id: JobId, state: JobState },

    #[error("job {job_id} has not had its sub-task count initialised")]
    NotInitialised { job_id: JobId },

    #[error("job {job_id} already has its sub-task count initialised")]
    AlreadyInitialised { job_id: JobId },

    #[error("job {job_id} already completed all {total} sub-tasks")]
    CountExceeded { job_id: JobId, total: u32 },
}
