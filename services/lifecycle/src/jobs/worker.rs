//! Queue consumer.
//!
//! Claims a batch of messages per poll and handles them concurrently. A site
//! sub-task is acked once its completion has been counted; if counting fails
//! for a transient reason the message is left to be redelivered, and the
//! step runs again.

use std::sync::Arc;

use chrono::Local;
use futures_util::future::join_all;
use regime_events::{QueueMessage, SiteJobMessage};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::{JobCoordinator, JobError, SiteContext, SiteSteps, StepReport};
use crate::config::QueueWorkerConfig;
use crate::monitoring::{Failure, MonitoringSink};
use crate::movements::MovementHandler;
use crate::ports::{Delivery, JobQueue, SiteConfigStore};

pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    coordinator: Arc<JobCoordinator>,
    steps: Arc<SiteSteps>,
    sites: Arc<dyn SiteConfigStore>,
    movements: Arc<MovementHandler>,
    monitor: Arc<dyn MonitoringSink>,
    config: QueueWorkerConfig,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        coordinator: Arc<JobCoordinator>,
        steps: Arc<SiteSteps>,
        sites: Arc<dyn SiteConfigStore>,
        movements: Arc<MovementHandler>,
        monitor: Arc<dyn MonitoringSink>,
        config: QueueWorkerConfig,
    ) -> Self {
        Self {
            queue,
            coordinator,
            steps,
            sites,
            movements,
            monitor,
            config,
        }
    }

    /// Polls the queue until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting queue worker"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Keep draining while batches come back full.
                    loop {
                        match self.poll_once().await {
                            Ok(handled) if handled >= self.config.concurrency => continue,
                            Ok(_) => break,
                            Err(e) => {
                                error!(error = %e, "Failed to receive queue messages");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Queue worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Claims and handles one batch. Returns how many messages it held.
    pub async fn poll_once(&self) -> Result<usize, JobError> {
        let deliveries = self.queue.receive(self.config.concurrency.max(1)).await?;
        let count = deliveries.len();
        join_all(deliveries.into_iter().map(|d| self.handle(d))).await;
        Ok(count)
    }

    async fn handle(&self, delivery: Delivery) {
        let label = delivery.message.label();
        debug!(delivery_id = delivery.delivery_id, attempts = delivery.attempts, message = %label, "Handling message");

        let ack = match &delivery.message {
            QueueMessage::SiteJob(message) => self.handle_site_job(message).await,
            QueueMessage::PrisonerMovement(message) => {
                let now = Local::now().naive_local();
                if let Err(e) = self.movements.handle(message, now).await {
                    self.monitor.capture(Failure::Movement {
                        label: label.clone(),
                        error: e.to_string(),
                    });
                }
                true
            }
        };

        if ack {
            if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                warn!(delivery_id = delivery.delivery_id, error = %e, "Failed to ack message");
            }
        }
    }

    /// Runs one site's step and counts it. Returns whether to ack.
    async fn handle_site_job(&self, message: &SiteJobMessage) -> bool {
        match self.run_step(message).await {
            Ok(report) => info!(
                job_id = %message.job_id,
                job_type = %message.job_type,
                prison_code = %message.prison_code,
                processed = report.processed,
                changed = report.changed,
                failed = report.failed,
                "Site step complete"
            ),
            Err(e) => self.monitor.capture(Failure::SiteStep {
                job_id: message.job_id,
                job_type: message.job_type,
                prison_code: message.prison_code.clone(),
                error: e.to_string(),
            }),
        }

        match self.coordinator.complete_sub_task(message).await {
            Ok(_) => true,
            Err(e) if e.is_invariant_violation() => {
                error!(job_id = %message.job_id, error = %e, "Sub-task completion rejected");
                true
            }
            Err(JobError::Publish { job_id, source }) => {
                error!(job_id = %message.job_id, next_job_id = %job_id, error = %source, "Failed to start next phase");
                true
            }
            Err(e) => {
                warn!(job_id = %message.job_id, error = %e, "Failed to count sub-task, leaving for redelivery");
                false
            }
        }
    }

    async fn run_step(&self, message: &SiteJobMessage) -> Result<StepReport, JobError> {
        let site = self
            .sites
            .site(&message.prison_code)
            .await?
            .ok_or_else(|| JobError::SiteNotConfigured(message.prison_code.clone()))?;

        let now = Local::now().naive_local();
        let ctx = SiteContext {
            prison_code: message.prison_code.clone(),
            date: message.date.unwrap_or_else(|| now.date()),
            now,
            flags: message.flags,
            site,
        };
        self.steps.step(message.job_type).run(&ctx).await
    }
}
