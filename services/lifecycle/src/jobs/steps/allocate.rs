//! ALLOCATE: starts pending allocations whose start date has arrived.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use regime_domain::{Allocation, AllocationStatus, AttendanceReason, PrisonerSnapshot};
use regime_events::JobType;
use regime_id::PrisonerNumber;
use tracing::{info, instrument, warn};

use super::{SiteContext, SiteStep, StepDeps, StepReport};
use crate::error::LifecycleError;
use crate::jobs::JobError;
use crate::unit_of_work::AttendanceEffect;

pub(crate) const ABSENT_REASON: &str = "Temporarily released or transferred";
pub(crate) const PLANNED_REASON: &str = "Planned suspension";

pub struct ActivatePending {
    deps: StepDeps,
}

impl ActivatePending {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn start(
        &self,
        ctx: &SiteContext,
        mut allocation: Allocation,
        snapshot: &PrisonerSnapshot,
    ) -> Result<bool, LifecycleError> {
        let effect = if !snapshot.is_at(&ctx.prison_code) {
            allocation.auto_suspend(ctx.now, ABSENT_REASON)?;
            AttendanceEffect::Suspend {
                reason: AttendanceReason::AutoSuspended,
                issue_payment: false,
            }
        } else if let Some((paid, planned_by)) = allocation
            .suspension_on(ctx.date)
            .map(|plan| (plan.paid, plan.planned_by.clone()))
        {
            allocation.suspend(ctx.now, PLANNED_REASON, &planned_by, paid)?;
            AttendanceEffect::Suspend {
                reason: AttendanceReason::Suspended,
                issue_payment: paid,
            }
        } else {
            allocation.activate()?;
            AttendanceEffect::Unchanged
        };

        self.deps
            .work
            .apply(allocation, effect, ctx.date, ctx.now)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl SiteStep for ActivatePending {
    fn job_type(&self) -> JobType {
        JobType::Allocate
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let due: Vec<Allocation> = self
            .deps
            .work
            .store
            .allocations_by_status(&ctx.prison_code, &[AllocationStatus::Pending])
            .await?
            .into_iter()
            .filter(|allocation| allocation.start_date <= ctx.date)
            .collect();

        let mut report = StepReport::default();
        if due.is_empty() {
            return Ok(report);
        }

        let numbers: Vec<PrisonerNumber> = due
            .iter()
            .map(|a| a.prisoner_number.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let snapshots = self.deps.prisoners.find_by_prisoner_numbers(&numbers).await?;
        let by_number: HashMap<&PrisonerNumber, &PrisonerSnapshot> = snapshots
            .iter()
            .map(|s| (&s.prisoner_number, s))
            .collect();

        for allocation in due {
            let Some(snapshot) = by_number.get(&allocation.prisoner_number) else {
                warn!(
                    allocation_id = %allocation.allocation_id,
                    prisoner_number = %allocation.prisoner_number,
                    "Prisoner not found, leaving allocation pending"
                );
                report.processed += 1;
                continue;
            };
            let allocation_id = allocation.allocation_id;
            let outcome = self.start(ctx, allocation, snapshot).await;
            self.deps
                .tally(&mut report, ctx, self.job_type(), allocation_id, outcome);
        }

        info!(
            processed = report.processed,
            changed = report.changed,
            failed = report.failed,
            "Pending allocations started"
        );
        Ok(report)
    }
}
