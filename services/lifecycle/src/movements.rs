//! Inbound prisoner movements.
//!
//! Each affected allocation is committed on its own. A failure on one is
//! logged and the rest still go through; the first failure is returned.

use chrono::NaiveDateTime;
use regime_domain::{AllocationStatus, AttendanceReason, DeallocationReason, SYSTEM_ACTOR};
use regime_events::{MovementKind, PrisonerMovementMessage};
use regime_id::AllocationId;
use tracing::{info, instrument, warn};

use crate::error::LifecycleError;
use crate::jobs::steps::ABSENT_REASON;
use crate::ports::ChangeSet;
use crate::unit_of_work::{AttendanceEffect, UnitOfWork};

pub struct MovementHandler {
    work: UnitOfWork,
}

impl MovementHandler {
    pub fn new(work: UnitOfWork) -> Self {
        Self { work }
    }

    /// Applies one movement. Returns how many allocations changed.
    #[instrument(skip(self, message), fields(kind = ?message.kind, prison_code = %message.prison_code, prisoner_number = %message.prisoner_number))]
    pub async fn handle(
        &self,
        message: &PrisonerMovementMessage,
        now: NaiveDateTime,
    ) -> Result<usize, LifecycleError> {
        let changed = match message.kind {
            MovementKind::TemporarilyReleased => self.temporarily_released(message, now).await?,
            MovementKind::Received => self.received(message, now).await?,
            MovementKind::Released => self.released(message, now).await?,
        };
        info!(changed, "Movement applied");
        Ok(changed)
    }

    async fn temporarily_released(
        &self,
        message: &PrisonerMovementMessage,
        now: NaiveDateTime,
    ) -> Result<usize, LifecycleError> {
        let allocations = self
            .work
            .store
            .allocations_for_prisoner(&message.prison_code, &message.prisoner_number)
            .await?;

        let mut outcome = Outcome::default();
        for mut allocation in allocations
            .into_iter()
            .filter(|a| a.status != AllocationStatus::AutoSuspended)
        {
            let allocation_id = allocation.allocation_id;
            let result = async move {
                allocation.auto_suspend(now, ABSENT_REASON)?;
                self.work
                    .apply(
                        allocation,
                        AttendanceEffect::Suspend {
                            reason: AttendanceReason::AutoSuspended,
                            issue_payment: false,
                        },
                        now.date(),
                        now,
                    )
                    .await?;
                Ok::<(), LifecycleError>(())
            }
            .await;
            outcome.record(allocation_id, result);
        }
        outcome.finish()
    }

    async fn received(
        &self,
        message: &PrisonerMovementMessage,
        now: NaiveDateTime,
    ) -> Result<usize, LifecycleError> {
        let allocations = self
            .work
            .store
            .allocations_for_prisoner(&message.prison_code, &message.prisoner_number)
            .await?;

        let mut outcome = Outcome::default();
        for mut allocation in allocations
            .into_iter()
            .filter(|a| a.status == AllocationStatus::AutoSuspended)
        {
            let allocation_id = allocation.allocation_id;
            let result = async move {
                let status = allocation.reactivate(now)?;
                info!(allocation_id = %allocation_id, status = %status, "Allocation reactivated");
                self.work
                    .apply(
                        allocation,
                        AttendanceEffect::Reset {
                            reason: AttendanceReason::AutoSuspended,
                        },
                        now.date(),
                        now,
                    )
                    .await?;
                Ok::<(), LifecycleError>(())
            }
            .await;
            outcome.record(allocation_id, result);
        }
        outcome.finish()
    }

    async fn released(
        &self,
        message: &PrisonerMovementMessage,
        now: NaiveDateTime,
    ) -> Result<usize, LifecycleError> {
        let store = &self.work.store;
        let allocations = store
            .allocations_for_prisoner(&message.prison_code, &message.prisoner_number)
            .await?;

        let mut outcome = Outcome::default();
        for mut allocation in allocations {
            let allocation_id = allocation.allocation_id;
            let result = async move {
                allocation.deallocate_now(now, DeallocationReason::Released, SYSTEM_ACTOR)?;
                self.work
                    .commit(ChangeSet {
                        allocations: vec![allocation],
                        ..Default::default()
                    })
                    .await?;
                Ok::<(), LifecycleError>(())
            }
            .await;
            outcome.record(allocation_id, result);
        }

        let removed: Vec<_> = store
            .open_waiting_list(&message.prison_code)
            .await?
            .into_iter()
            .filter(|w| w.prisoner_number == message.prisoner_number)
            .filter_map(|mut w| w.remove().then_some(w))
            .collect();
        if !removed.is_empty() {
            info!(removed = removed.len(), "Waiting list applications removed");
            self.work
                .commit(ChangeSet {
                    waiting_list: removed,
                    ..Default::default()
                })
                .await?;
        }

        outcome.finish()
    }
}

#[derive(Default)]
struct Outcome {
    changed: usize,
    first_error: Option<LifecycleError>,
}

impl Outcome {
    fn record(&mut self, allocation_id: AllocationId, result: Result<(), LifecycleError>) {
        match result {
            Ok(()) => self.changed += 1,
            Err(e) => {
                warn!(allocation_id = %allocation_id, error = %e, "Failed to apply movement to allocation");
                self.first_error.get_or_insert(e);
            }
        }
    }

    fn finish(self) -> Result<usize, LifecycleError> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.changed),
        }
    }
}
