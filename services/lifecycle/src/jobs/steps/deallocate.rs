//! DEALLOCATE_ENDING and DEALLOCATE_EXPIRING.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use regime_domain::expiry::absent_from;
use regime_domain::{
    Allocation, AllocationStatus, DeallocationReason, ExpiryPolicy, WaitingListApplication,
    SYSTEM_ACTOR,
};
use regime_events::JobType;
use regime_id::{AllocationId, PrisonerNumber};
use tracing::{info, instrument, warn};

use super::{SiteContext, SiteStep, StepDeps, StepReport};
use crate::error::LifecycleError;
use crate::jobs::JobError;
use crate::ports::ChangeSet;

const OPEN_STATUSES: [AllocationStatus; 5] = [
    AllocationStatus::Pending,
    AllocationStatus::Active,
    AllocationStatus::Suspended,
    AllocationStatus::SuspendedWithPay,
    AllocationStatus::AutoSuspended,
];

pub struct DeallocateEnding {
    deps: StepDeps,
}

impl DeallocateEnding {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn end(
        &self,
        ctx: &SiteContext,
        mut allocation: Allocation,
        reason: DeallocationReason,
    ) -> Result<bool, LifecycleError> {
        allocation.deallocate_now(ctx.now, reason, SYSTEM_ACTOR)?;
        self.deps
            .work
            .commit(ChangeSet {
                allocations: vec![allocation],
                ..Default::default()
            })
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl SiteStep for DeallocateEnding {
    fn job_type(&self) -> JobType {
        JobType::DeallocateEnding
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let store = &self.deps.work.store;
        let mut report = StepReport::default();
        let mut handled: HashSet<AllocationId> = HashSet::new();

        // Schedule endings first; they take priority over per-allocation plans.
        for schedule in store.schedules_ending_by(&ctx.prison_code, ctx.date).await? {
            let allocations = store
                .allocations_for_schedule(schedule.activity_schedule_id)
                .await?;
            info!(
                activity_schedule_id = %schedule.activity_schedule_id,
                allocations = allocations.len(),
                "Ending allocations on finished schedule"
            );
            for allocation in allocations.into_iter().filter(|a| !a.is_ended()) {
                let allocation_id = allocation.allocation_id;
                handled.insert(allocation_id);
                let outcome = self.end(ctx, allocation, DeallocationReason::Ended).await;
                self.deps
                    .tally(&mut report, ctx, self.job_type(), allocation_id, outcome);
            }
        }

        let due: Vec<(Allocation, DeallocationReason)> = store
            .allocations_by_status(&ctx.prison_code, &OPEN_STATUSES)
            .await?
            .into_iter()
            .filter(|a| !handled.contains(&a.allocation_id))
            .filter_map(|a| a.deallocation_due(ctx.date).map(|reason| (a, reason)))
            .collect();

        for (allocation, reason) in due {
            let allocation_id = allocation.allocation_id;
            let outcome = self.end(ctx, allocation, reason).await;
            self.deps
                .tally(&mut report, ctx, self.job_type(), allocation_id, outcome);
        }

        info!(changed = report.changed, failed = report.failed, "Ending allocations deallocated");
        Ok(report)
    }
}

pub struct DeallocateExpiring {
    deps: StepDeps,
}

impl DeallocateExpiring {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    async fn expire(
        &self,
        ctx: &SiteContext,
        allocations: Vec<Allocation>,
        waiting_list: Vec<WaitingListApplication>,
    ) -> Result<bool, LifecycleError> {
        let mut changes = ChangeSet::default();
        for mut allocation in allocations {
            allocation.deallocate_now(
                ctx.now,
                DeallocationReason::TemporarilyReleased,
                SYSTEM_ACTOR,
            )?;
            changes.allocations.push(allocation);
        }
        for mut application in waiting_list {
            if application.remove() {
                changes.waiting_list.push(application);
            }
        }

        let changed = !changes.is_empty();
        self.deps.work.commit(changes).await?;
        Ok(changed)
    }
}

#[async_trait]
impl SiteStep for DeallocateExpiring {
    fn job_type(&self) -> JobType {
        JobType::DeallocateExpiring
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let store = &self.deps.work.store;
        let allocations = store
            .allocations_by_status(
                &ctx.prison_code,
                &[AllocationStatus::Pending, AllocationStatus::AutoSuspended],
            )
            .await?;
        let waiting_list = store.open_waiting_list(&ctx.prison_code).await?;

        let candidates: Vec<PrisonerNumber> = allocations
            .iter()
            .map(|a| a.prisoner_number.clone())
            .chain(waiting_list.iter().map(|w| w.prisoner_number.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut report = StepReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }

        let snapshots = self
            .deps
            .prisoners
            .find_by_prisoner_numbers(&candidates)
            .await?;
        let absent = absent_from(&ctx.prison_code, &candidates, &snapshots);
        if absent.is_empty() {
            return Ok(report);
        }

        let movements = self.deps.movements.movements_for(&absent).await?;
        let decision =
            ExpiryPolicy::new(ctx.site.max_days_to_expiry).decide(ctx.date, &absent, &movements);

        for prisoner in &decision.no_movements {
            warn!(prisoner_number = %prisoner, "Absent prisoner has no movements, leaving unchanged");
        }

        for prisoner in decision.expired {
            let theirs: Vec<Allocation> = allocations
                .iter()
                .filter(|a| a.prisoner_number == prisoner)
                .cloned()
                .collect();
            let applications: Vec<WaitingListApplication> = waiting_list
                .iter()
                .filter(|w| w.prisoner_number == prisoner)
                .cloned()
                .collect();

            let outcome = self.expire(ctx, theirs, applications).await;
            self.deps
                .tally(&mut report, ctx, self.job_type(), &prisoner, outcome);
        }

        info!(
            expired = report.changed,
            retained = decision.retained.len(),
            no_movements = decision.no_movements.len(),
            failed = report.failed,
            "Expiry check complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, date, Fixture};
    use regime_domain::{CustodyStatus, WaitingListStatus};

    #[tokio::test]
    async fn test_schedule_end_takes_priority() {
        let fixture = Fixture::new();
        let mut allocation = fixture.allocation_with_status("A1234BC", AllocationStatus::Active);
        allocation
            .plan_deallocation(
                date(2024, 3, 1),
                DeallocationReason::Security,
                "staff",
                at(2024, 2, 1, 9),
            )
            .unwrap();
        fixture.store.put_allocation(allocation.clone());
        fixture.end_schedule(date(2024, 3, 1));

        let report = DeallocateEnding::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 22)))
            .await
            .unwrap();

        assert_eq!(report.changed, 1);
        let stored = fixture.store.allocation(allocation.allocation_id).unwrap();
        assert_eq!(stored.status, AllocationStatus::Ended);
        assert_eq!(stored.deallocated_reason, Some(DeallocationReason::Ended));
    }

    #[tokio::test]
    async fn test_planned_deallocation_uses_plan_reason() {
        let fixture = Fixture::new();
        let mut allocation = fixture.allocation_with_status("A1234BC", AllocationStatus::Suspended);
        allocation
            .plan_deallocation(
                date(2024, 3, 1),
                DeallocationReason::Healthcare,
                "staff",
                at(2024, 2, 1, 9),
            )
            .unwrap();
        fixture.store.put_allocation(allocation.clone());
        let untouched = fixture.allocation_with_status("B2345CD", AllocationStatus::Active);

        DeallocateEnding::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 22)))
            .await
            .unwrap();

        let stored = fixture.store.allocation(allocation.allocation_id).unwrap();
        assert_eq!(stored.status, AllocationStatus::Ended);
        assert_eq!(stored.deallocated_reason, Some(DeallocationReason::Healthcare));
        assert_eq!(
            fixture.store.allocation(untouched.allocation_id).unwrap().status,
            AllocationStatus::Active
        );
    }

    #[tokio::test]
    async fn test_expired_absence_deallocates_and_removes_waiting_list() {
        let fixture = Fixture::with_expiry_days(21);
        let allocation = fixture.allocation_with_status("A1234BC", AllocationStatus::AutoSuspended);
        let application = fixture.waiting_list_entry("A1234BC", WaitingListStatus::Approved);
        let recent = fixture.allocation_with_status("B2345CD", AllocationStatus::AutoSuspended);
        fixture.prisoners.set(vec![
            fixture.snapshot("A1234BC", CustodyStatus::ActiveOut),
            fixture.snapshot("B2345CD", CustodyStatus::ActiveOut),
        ]);
        fixture.movements.set(vec![
            fixture.movement("A1234BC", at(2024, 2, 9, 10)),
            fixture.movement("B2345CD", at(2024, 2, 10, 10)),
        ]);

        let report = DeallocateExpiring::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 22)))
            .await
            .unwrap();

        assert_eq!(report.changed, 1);
        let stored = fixture.store.allocation(allocation.allocation_id).unwrap();
        assert_eq!(stored.status, AllocationStatus::Ended);
        assert_eq!(
            stored.deallocated_reason,
            Some(DeallocationReason::TemporarilyReleased)
        );
        assert_eq!(
            fixture.store.waiting_list_entry(application).unwrap().status,
            WaitingListStatus::Removed
        );
        assert_eq!(
            fixture.store.allocation(recent.allocation_id).unwrap().status,
            AllocationStatus::AutoSuspended
        );
    }

    #[tokio::test]
    async fn test_present_or_unmoved_prisoners_are_kept() {
        let fixture = Fixture::with_expiry_days(1);
        let present = fixture.pending_allocation("A1234BC", date(2024, 1, 1));
        let unmoved = fixture.allocation_with_status("B2345CD", AllocationStatus::AutoSuspended);
        fixture.prisoners.set(vec![
            fixture.snapshot("A1234BC", CustodyStatus::ActiveIn),
            fixture.snapshot("B2345CD", CustodyStatus::ActiveOut),
        ]);

        let report = DeallocateExpiring::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 22)))
            .await
            .unwrap();

        assert_eq!(report.changed, 0);
        assert!(!fixture.store.allocation(present.allocation_id).unwrap().is_ended());
        assert!(!fixture.store.allocation(unmoved.allocation_id).unwrap().is_ended());
    }
}
