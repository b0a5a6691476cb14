//! START_SUSPENSIONS and END_SUSPENSIONS: move allocations in and out of
//! their planned suspension windows.

use async_trait::async_trait;
use regime_domain::{Allocation, AllocationStatus, AttendanceReason, SYSTEM_ACTOR};
use regime_events::JobType;
use tracing::{info, instrument};

use super::allocate::PLANNED_REASON;
use super::{SiteContext, SiteStep, StepDeps, StepReport};
use crate::error::LifecycleError;
use crate::jobs::JobError;
use crate::unit_of_work::AttendanceEffect;

pub struct StartSuspensions {
    deps: StepDeps,
}

impl StartSuspensions {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn start(&self, ctx: &SiteContext, mut allocation: Allocation) -> Result<bool, LifecycleError> {
        let Some((paid, planned_by)) = allocation
            .suspension_on(ctx.date)
            .map(|plan| (plan.paid, plan.planned_by.clone()))
        else {
            return Ok(false);
        };

        allocation.suspend(ctx.now, PLANNED_REASON, &planned_by, paid)?;
        self.deps
            .work
            .apply(
                allocation,
                AttendanceEffect::Suspend {
                    reason: AttendanceReason::Suspended,
                    issue_payment: paid,
                },
                ctx.date,
                ctx.now,
            )
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl SiteStep for StartSuspensions {
    fn job_type(&self) -> JobType {
        JobType::StartSuspensions
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let active = self
            .deps
            .work
            .store
            .allocations_by_status(&ctx.prison_code, &[AllocationStatus::Active])
            .await?;

        let mut report = StepReport::default();
        for allocation in active
            .into_iter()
            .filter(|a| a.suspension_on(ctx.date).is_some())
        {
            let allocation_id = allocation.allocation_id;
            let outcome = self.start(ctx, allocation).await;
            self.deps
                .tally(&mut report, ctx, self.job_type(), allocation_id, outcome);
        }

        info!(changed = report.changed, failed = report.failed, "Planned suspensions started");
        Ok(report)
    }
}

pub struct EndSuspensions {
    deps: StepDeps,
}

impl EndSuspensions {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn end(&self, ctx: &SiteContext, mut allocation: Allocation) -> Result<bool, LifecycleError> {
        allocation.end_planned_suspension(SYSTEM_ACTOR, ctx.now);
        allocation.unsuspend()?;
        self.deps
            .work
            .apply(
                allocation,
                AttendanceEffect::Reset {
                    reason: AttendanceReason::Suspended,
                },
                ctx.date,
                ctx.now,
            )
            .await?;
        Ok(true)
    }
}

/// Whether a suspended allocation's window has run out by `ctx.date`.
fn window_over(allocation: &Allocation, ctx: &SiteContext) -> bool {
    allocation
        .planned_suspension
        .as_ref()
        .is_some_and(|plan| !plan.applies_on(ctx.date))
}

#[async_trait]
impl SiteStep for EndSuspensions {
    fn job_type(&self) -> JobType {
        JobType::EndSuspensions
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let suspended = self
            .deps
            .work
            .store
            .allocations_by_status(
                &ctx.prison_code,
                &[AllocationStatus::Suspended, AllocationStatus::SuspendedWithPay],
            )
            .await?;

        let mut report = StepReport::default();
        for allocation in suspended.into_iter().filter(|a| window_over(a, ctx)) {
            let allocation_id = allocation.allocation_id;
            let outcome = self.end(ctx, allocation).await;
            self.deps
                .tally(&mut report, ctx, self.job_type(), allocation_id, outcome);
        }

        info!(changed = report.changed, failed = report.failed, "Planned suspensions ended");
        Ok(report)
    }
}
