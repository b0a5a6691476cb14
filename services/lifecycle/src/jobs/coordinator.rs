//! Job creation, fan-out and phase chaining.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use regime_domain::{Job, Pipeline};
use regime_events::{JobFlags, JobType, QueueMessage, SiteJobMessage};
use regime_id::JobId;
use tracing::{error, info, instrument, warn};

use super::JobError;
use crate::ports::{JobQueue, JobStore, SiteConfigStore};

pub struct JobCoordinator {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    sites: Arc<dyn SiteConfigStore>,
}

impl JobCoordinator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        sites: Arc<dyn SiteConfigStore>,
    ) -> Self {
        Self { jobs, queue, sites }
    }

    /// Starts the first phase of `pipeline` for `date`.
    pub async fn run_pipeline(
        &self,
        pipeline: Pipeline,
        date: NaiveDate,
        flags: JobFlags,
    ) -> Result<Vec<JobId>, JobError> {
        info!(pipeline = %pipeline, date = %date, "Starting pipeline");
        self.run_distributed_job(pipeline.first(), date, flags).await
    }

    /// Creates a job for `job_type` and publishes one message per rolled-out
    /// site.
    ///
    /// With no sites the job succeeds at once and the following phase starts
    /// straight away. Returns the ids of every job created, in order.
    #[instrument(skip(self, flags), fields(job_type = %job_type, date = %date))]
    pub async fn run_distributed_job(
        &self,
        job_type: JobType,
        date: NaiveDate,
        flags: JobFlags,
    ) -> Result<Vec<JobId>, JobError> {
        let mut started = Vec::new();
        let mut next = Some(job_type);

        while let Some(job_type) = next.take() {
            let sites = self.sites.rolled_out().await?;

            let job = Job::new(job_type, Utc::now());
            self.jobs.create(&job).await?;
            let total = u32::try_from(sites.len()).unwrap_or(u32::MAX);
            self.jobs.initialise_counts(job.job_id, total).await?;
            started.push(job.job_id);

            if sites.is_empty() {
                info!(job_id = %job.job_id, job_type = %job_type, "No rolled-out sites, job complete");
                next = Pipeline::next_after(job_type, flags);
                continue;
            }

            let messages: Vec<QueueMessage> = sites
                .into_iter()
                .map(|site| {
                    SiteJobMessage {
                        job_id: job.job_id,
                        job_type,
                        prison_code: site.prison_code,
                        date: Some(date),
                        flags,
                    }
                    .into()
                })
                .collect();

            if let Err(source) = self.queue.publish(&messages).await {
                error!(job_id = %job.job_id, error = %source, "Failed to publish site messages");
                if let Err(e) = self.jobs.fail(job.job_id).await {
                    warn!(job_id = %job.job_id, error = %e, "Failed to mark job as failed");
                }
                return Err(JobError::Publish {
                    job_id: job.job_id,
                    source,
                });
            }

            info!(
                job_id = %job.job_id,
                job_type = %job_type,
                sites = messages.len(),
                "Published site messages"
            );
        }

        Ok(started)
    }

    /// Counts one site's sub-task as done. Returns whether this call
    /// completed the job, in which case the next phase has been started.
    #[instrument(skip(self, message), fields(job_id = %message.job_id, prison_code = %message.prison_code))]
    pub async fn complete_sub_task(&self, message: &SiteJobMessage) -> Result<bool, JobError> {
        if !self
            .jobs
            .increment_count(message.job_id, &message.prison_code)
            .await?
        {
            return Ok(false);
        }

        info!(job_id = %message.job_id, job_type = %message.job_type, "Job succeeded");

        if let Some(next) = Pipeline::next_after(message.job_type, message.flags) {
            let date = message
                .date
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            self.run_distributed_job(next, date, message.flags).await?;
        }
        Ok(true)
    }
}
