//! Failure reporting for work that is caught rather than propagated.

use regime_events::JobType;
use regime_id::{JobId, PrisonCode};
use tracing::error;

/// Something that went wrong without stopping the surrounding work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// A site's sub-task of a distributed job failed.
    SiteStep {
        job_id: JobId,
        job_type: JobType,
        prison_code: PrisonCode,
        error: String,
    },
    /// A single record inside a site step failed and was rolled back.
    Record {
        job_type: JobType,
        prison_code: PrisonCode,
        record: String,
        error: String,
    },
    /// An inbound movement could not be applied.
    Movement { label: String, error: String },
}

pub trait MonitoringSink: Send + Sync {
    fn capture(&self, failure: Failure);
}

/// Reports failures to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl MonitoringSink for TracingMonitor {
    fn capture(&self, failure: Failure) {
        match failure {
            Failure::SiteStep {
                job_id,
                job_type,
                prison_code,
                error,
            } => error!(
                job_id = %job_id,
                job_type = %job_type,
                prison_code = %prison_code,
                error = %error,
                "Site step failed"
            ),
            Failure::Record {
                job_type,
                prison_code,
                record,
                error,
            } => error!(
                job_type = %job_type,
                prison_code = %prison_code,
                record = %record,
                error = %error,
                "Record update failed"
            ),
            Failure::Movement { label, error } => {
                error!(movement = %label, error = %error, "Movement handling failed")
            }
        }
    }
}
