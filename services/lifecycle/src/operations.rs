//! Explicit suspend and unsuspend requests.
//!
//! Every allocation in a request is validated before anything is written, so
//! a request that fails validation changes nothing. Dates of today take
//! effect at once; later dates are left to the daily suspension phases.

use chrono::{NaiveDate, NaiveDateTime};
use regime_domain::{Allocation, AllocationStatus, AttendanceReason};
use regime_id::{AllocationId, PrisonCode};
use tracing::{info, instrument};

use crate::error::LifecycleError;
use crate::jobs::steps::PLANNED_REASON;
use crate::unit_of_work::{AttendanceEffect, UnitOfWork};

pub struct AllocationOperations {
    work: UnitOfWork,
}

impl AllocationOperations {
    pub fn new(work: UnitOfWork) -> Self {
        Self { work }
    }

    /// Loads every requested allocation, all at `prison`.
    async fn load(
        &self,
        prison: &PrisonCode,
        ids: &[AllocationId],
    ) -> Result<Vec<Allocation>, LifecycleError> {
        let found = self.work.store.allocations_by_ids(ids).await?;
        ids.iter()
            .map(|id| {
                found
                    .iter()
                    .find(|a| a.allocation_id == *id && &a.prison_code == prison)
                    .cloned()
                    .ok_or_else(|| LifecycleError::NotFound {
                        allocation_id: *id,
                        prison_code: prison.clone(),
                    })
            })
            .collect()
    }

    /// Plans a suspension from `suspend_from` for each allocation. A pending
    /// allocation only records the plan; activation applies it.
    #[instrument(skip(self, ids), fields(prison_code = %prison, count = ids.len()))]
    pub async fn suspend(
        &self,
        prison: &PrisonCode,
        ids: &[AllocationId],
        suspend_from: NaiveDate,
        paid: bool,
        by: &str,
        now: NaiveDateTime,
    ) -> Result<(), LifecycleError> {
        let mut allocations = self.load(prison, ids).await?;
        for allocation in &mut allocations {
            allocation.plan_suspension(suspend_from, paid, by, now)?;
        }

        let today = now.date();
        for mut allocation in allocations {
            let effect = if suspend_from != today
                || allocation.status == AllocationStatus::Pending
            {
                AttendanceEffect::Unchanged
            } else if allocation.status == AllocationStatus::AutoSuspended {
                // Stays auto-suspended; its records pick up the plan.
                AttendanceEffect::Reset {
                    reason: AttendanceReason::AutoSuspended,
                }
            } else {
                allocation.suspend(now, PLANNED_REASON, by, paid)?;
                AttendanceEffect::Suspend {
                    reason: AttendanceReason::Suspended,
                    issue_payment: paid,
                }
            };
            self.work.apply(allocation, effect, today, now).await?;
        }

        info!(suspend_from = %suspend_from, paid, "Suspension planned");
        Ok(())
    }

    /// Ends the planned suspension of each allocation on `suspend_until`.
    #[instrument(skip(self, ids), fields(prison_code = %prison, count = ids.len()))]
    pub async fn unsuspend(
        &self,
        prison: &PrisonCode,
        ids: &[AllocationId],
        suspend_until: NaiveDate,
        by: &str,
        now: NaiveDateTime,
    ) -> Result<(), LifecycleError> {
        let mut allocations = self.load(prison, ids).await?;
        for allocation in &mut allocations {
            allocation.plan_unsuspension(suspend_until, now)?;
        }

        let today = now.date();
        for mut allocation in allocations {
            let effect = if suspend_until != today {
                AttendanceEffect::Unchanged
            } else {
                allocation.end_planned_suspension(by, now);
                if allocation.status.is_manually_suspended() {
                    allocation.unsuspend()?;
                }
                AttendanceEffect::Reset {
                    reason: AttendanceReason::Suspended,
                }
            };
            self.work.apply(allocation, effect, today, now).await?;
        }

        info!(suspend_until = %suspend_until, "Unsuspension planned");
        Ok(())
    }
}
