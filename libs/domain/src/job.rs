//! Distributed job bookkeeping.
//!
//! A job fans one phase out to every participating site. It moves through
//! CREATED → RUNNING (once its sub-task total is known) → SUCCEEDED or FAILED,
//! and never changes again after that.

use chrono::{DateTime, Utc};
use regime_events::JobType;
use regime_id::JobId;
use serde::{Deserialize, Serialize};

use crate::JobStateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: JobType,
    pub total_sub_tasks: Option<u32>,
    pub completed_sub_tasks: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub successful: bool,
}

impl Job {
    pub fn new(job_type: JobType, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: JobId::new(),
            job_type,
            total_sub_tasks: None,
            completed_sub_tasks: 0,
            started_at,
            ended_at: None,
            successful: false,
        }
    }

    pub fn state(&self) -> JobState {
        match (self.ended_at, self.successful, self.total_sub_tasks) {
            (Some(_), true, _) => JobState::Succeeded,
            (Some(_), false, _) => JobState::Failed,
            (None, _, Some(_)) => JobState::Running,
            (None, _, None) => JobState::Created,
        }
    }

    fn ensure_open(&self) -> Result<(), JobStateError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(JobStateError::Terminal {
                job_id: self.job_id,
                state,
            });
        }
        Ok(())
    }

    /// Sets the sub-task total. A total of zero succeeds the job at once.
    pub fn initialise_counts(&mut self, total: u32, at: DateTime<Utc>) -> Result<(), JobStateError> {
        self.ensure_open()?;
        if self.total_sub_tasks.is_some() {
            return Err(JobStateError::AlreadyInitialised { job_id: self.job_id });
        }
        self.total_sub_tasks = Some(total);
        if total == 0 {
            self.succeed(at)?;
        }
        Ok(())
    }

    /// Counts one completed sub-task.
    ///
    /// Returns `true` only for the completion that brings the count to the
    /// total, at which point the job has succeeded.
    pub fn record_completion(&mut self, at: DateTime<Utc>) -> Result<bool, JobStateError> {
        self.ensure_open()?;
        let Some(total) = self.total_sub_tasks else {
            return Err(JobStateError::NotInitialised { job_id: self.job_id });
        };
        if self.completed_sub_tasks >= total {
            return Err(JobStateError::CountExceeded {
                job_id: self.job_id,
                total,
            });
        }

        self.completed_sub_tasks += 1;
        if self.completed_sub_tasks == total {
            self.succeed(at)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn succeed(&mut self, at: DateTime<Utc>) -> Result<(), JobStateError> {
        self.ensure_open()?;
        self.ended_at = Some(at);
        self.successful = true;
        Ok(())
    }

    pub fn fail(&mut self, at: DateTime<Utc>) -> Result<(), JobStateError> {
        self.ensure_open()?;
        self.ended_at = Some(at);
        self.successful = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobType::Allocate, Utc::now())
    }

    #[test]
    fn test_lifecycle_reaches_success_once() {
        let mut job = job();
        assert_eq!(job.state(), JobState::Created);

        job.initialise_counts(3, Utc::now()).unwrap();
        assert_eq!(job.state(), JobState::Running);

        assert!(!job.record_completion(Utc::now()).unwrap());
        assert!(!job.record_completion(Utc::now()).unwrap());
        assert!(job.record_completion(Utc::now()).unwrap());
        assert_eq!(job.state(), JobState::Succeeded);

        let err = job.record_completion(Utc::now()).unwrap_err();
        assert!(matches!(err, JobStateError::Terminal { state: JobState::Succeeded, .. }));
    }

    #[test]
    fn test_zero_sub_tasks_succeeds_immediately() {
        let mut job = job();
        job.initialise_counts(0, Utc::now()).unwrap();
        assert_eq!(job.state(), JobState::Succeeded);
    }

    #[test]
    fn test_completion_before_initialisation_rejected() {
        let mut job = job();
        assert!(matches!(
            job.record_completion(Utc::now()),
            Err(JobStateError::NotInitialised { .. })
        ));
    }

    #[test]
    fn test_initialise_twice_rejected() {
        let mut job = job();
        job.initialise_counts(2, Utc::now()).unwrap();
        assert!(matches!(
            job.initialise_counts(2, Utc::now()),
            Err(JobStateError::AlreadyInitialised { .. })
        ));
    }

    #[test]
    fn test_failed_job_is_terminal() {
        let mut job = job();
        job.initialise_counts(2, Utc::now()).unwrap();
        job.fail(Utc::now()).unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert!(job.succeed(Utc::now()).is_err());
        assert!(job.record_completion(Utc::now()).is_err());
    }
}
