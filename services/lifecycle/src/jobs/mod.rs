//! Distributed jobs.
//!
//! A job is one phase of a pipeline run across every rolled-out site:
//! - The [`JobCoordinator`] creates the job, sizes its counter and fans out one
//!   queue message per site
//! - The [`QueueWorker`] runs the matching [`SiteStep`] for each message and
//!   reports the sub-task complete
//! - The completion that fills the counter starts the next phase

mod coordinator;
pub mod steps;
mod worker;

pub use coordinator::JobCoordinator;
pub use steps::{SiteContext, SiteStep, SiteSteps, StepDeps, StepReport};
pub use worker::QueueWorker;

use regime_domain::JobStateError;
use regime_id::{JobId, PrisonCode};
use thiserror::Error;

use crate::clients::ClientError;
use crate::db::DbError;

/// Errors from running or coordinating a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] DbError),

    /// A collaborator could not be reached. Transient.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("site {0} is not configured")]
    SiteNotConfigured(PrisonCode),

    /// The site messages could not be queued; the job has been failed.
    #[error("failed to publish job {job_id}: {source}")]
    Publish {
        job_id: JobId,
        #[source]
        source: DbError,
    },
}

impl JobError {
    /// A mutation the job state machine forbids, such as counting against a
    /// job that has already ended.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, JobError::Store(DbError::JobState(_)))
    }

    pub fn job_state(&self) -> Option<&JobStateError> {
        match self {
            JobError::Store(DbError::JobState(e)) => Some(e),
            _ => None,
        }
    }
}
