//! Daily pipeline trigger.
//!
//! Checks on an interval whether each pipeline's start time has passed today
//! and, if no job for its first phase has started today, starts it. The job
//! table is the record of what ran, so a restart does not re-run a pipeline.
//! Several workers may tick at once; only the one that claims the day's run
//! starts it.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use regime_domain::Pipeline;
use regime_events::JobFlags;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::config::ScheduleConfig;
use crate::jobs::{JobCoordinator, JobError};
use crate::ports::JobStore;

/// Whether a pipeline timed for `at` should start now.
pub fn is_due(now: NaiveDateTime, at: NaiveTime, last_started: Option<NaiveDate>) -> bool {
    now.time() >= at && last_started.map_or(true, |date| date < now.date())
}

pub struct DailySchedulerWorker {
    coordinator: Arc<JobCoordinator>,
    jobs: Arc<dyn JobStore>,
    schedule: ScheduleConfig,
}

impl DailySchedulerWorker {
    pub fn new(
        coordinator: Arc<JobCoordinator>,
        jobs: Arc<dyn JobStore>,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            coordinator,
            jobs,
            schedule,
        }
    }

    fn triggers(&self) -> [(Pipeline, NaiveTime, JobFlags); 3] {
        [
            (
                Pipeline::ManageAllocations,
                self.schedule.allocations,
                JobFlags::default(),
            ),
            (
                Pipeline::Deallocations,
                self.schedule.deallocations,
                JobFlags::default(),
            ),
            (
                Pipeline::ManageAttendances,
                self.schedule.attendances,
                JobFlags { with_expiry: true },
            ),
        ]
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            check_interval_secs = self.schedule.check_interval.as_secs(),
            "Starting daily scheduler"
        );

        let mut interval = tokio::time::interval(self.schedule.check_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Local::now().naive_local()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Daily scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Starts every pipeline that is due at `now`.
    pub async fn tick(&self, now: NaiveDateTime) {
        for (pipeline, at, flags) in self.triggers() {
            if let Err(e) = self.run_if_due(pipeline, at, flags, now).await {
                error!(pipeline = %pipeline, error = %e, "Failed to start pipeline");
            }
        }
    }

    async fn run_if_due(
        &self,
        pipeline: Pipeline,
        at: NaiveTime,
        flags: JobFlags,
        now: NaiveDateTime,
    ) -> Result<(), JobError> {
        let last_started = self
            .jobs
            .last_started(pipeline.first())
            .await?
            .map(|started| started.with_timezone(&Local).date_naive());

        if !is_due(now, at, last_started) {
            return Ok(());
        }

        if !self.jobs.claim_pipeline_run(pipeline, now.date()).await? {
            debug!(pipeline = %pipeline, date = %now.date(), "Pipeline run already claimed");
            return Ok(());
        }

        self.coordinator
            .run_pipeline(pipeline, now.date(), flags)
            .await?;
        Ok(())
    }
}
