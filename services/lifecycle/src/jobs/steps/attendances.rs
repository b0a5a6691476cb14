//! ATTENDANCE_CREATE and ATTENDANCE_EXPIRE.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Days;
use regime_domain::{plan_attendance, Allocation, ScheduledSession};
use regime_events::{DomainEvent, JobType};
use regime_id::ActivityScheduleId;
use tracing::{debug, info, instrument};

use super::{SiteContext, SiteStep, StepDeps, StepReport};
use crate::error::LifecycleError;
use crate::jobs::JobError;
use crate::ports::ChangeSet;

pub struct CreateAttendances {
    deps: StepDeps,
}

impl CreateAttendances {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    /// Creates the missing records for one session. Returns how many were
    /// inserted.
    async fn create_for(
        &self,
        ctx: &SiteContext,
        session: &ScheduledSession,
        allocations: &[Allocation],
    ) -> Result<usize, LifecycleError> {
        let attendees = self
            .deps
            .work
            .store
            .attendees(session.scheduled_instance_id)
            .await?;

        let new_attendances: Vec<_> = allocations
            .iter()
            .filter_map(|allocation| {
                let exists = attendees.contains(&allocation.prisoner_number);
                plan_attendance(session, allocation, exists, ctx.now)
            })
            .collect();

        let inserted = self
            .deps
            .work
            .commit(ChangeSet {
                new_attendances,
                ..Default::default()
            })
            .await?;
        Ok(inserted.len())
    }
}

#[async_trait]
impl SiteStep for CreateAttendances {
    fn job_type(&self) -> JobType {
        JobType::AttendanceCreate
    }

    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let store = &self.deps.work.store;
        let sessions = store.sessions_on(&ctx.prison_code, ctx.date).await?;

        let mut by_schedule: HashMap<ActivityScheduleId, Vec<Allocation>> = HashMap::new();
        let mut report = StepReport::default();
        let mut created = 0;

        for session in &sessions {
            if !by_schedule.contains_key(&session.activity_schedule_id) {
                let allocations = store
                    .allocations_for_schedule(session.activity_schedule_id)
                    .await?;
                by_schedule.insert(session.activity_schedule_id, allocations);
            }
            let allocations = by_schedule
                .get(&session.activity_schedule_id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let outcome = self.create_for(ctx, session, allocations).await;
            if let Ok(count) = &outcome {
                created += count;
                debug!(scheduled_instance_id = %session.scheduled_instance_id, created = count, "Session attendances created");
            }
            self.deps.tally(
                &mut report,
                ctx,
                self.job_type(),
                session.scheduled_instance_id,
                outcome.map(|count| count > 0),
            );
        }

        info!(sessions = sessions.len(), created, failed = report.failed, "Attendances created");
        Ok(report)
    }
}

pub struct ExpireAttendances {
    deps: StepDeps,
}

impl ExpireAttendances {
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl SiteStep for ExpireAttendances {
    fn job_type(&self) -> JobType {
        JobType::AttendanceExpire
    }

    /// Announces yesterday's unmarked attendances. Changes no data.
    #[instrument(skip(self, ctx), fields(prison_code = %ctx.prison_code, date = %ctx.date))]
    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError> {
        let Some(yesterday) = ctx.date.checked_sub_days(Days::new(1)) else {
            return Ok(StepReport::default());
        };

        let waiting = self
            .deps
            .work
            .store
            .waiting_attendances_on(&ctx.prison_code, yesterday)
            .await?;

        let events: Vec<DomainEvent> = waiting
            .iter()
            .copied()
            .map(DomainEvent::AttendanceExpired)
            .collect();
        self.deps.work.events.publish_after_commit(events).await;

        info!(expired = waiting.len(), date = %yesterday, "Unmarked attendances expired");
        Ok(StepReport {
            processed: waiting.len(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, date, Fixture};
    use regime_domain::{AllocationStatus, AttendanceReason, AttendanceStatus};

    #[tokio::test]
    async fn test_creates_one_attendance_per_session_and_prisoner() {
        let fixture = Fixture::new();
        fixture.allocation_with_status("A1234BC", AllocationStatus::Active);
        fixture.allocation_with_status("B2345CD", AllocationStatus::Active);
        let session = fixture.session(date(2024, 3, 1), 9);

        let step = CreateAttendances::new(fixture.deps());
        let ctx = fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 2));
        step.run(&ctx).await.unwrap();
        step.run(&ctx).await.unwrap();

        let records = fixture.store.attendances_for_session(session);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Waiting));

        let created = fixture
            .outbox
            .events()
            .into_iter()
            .filter(|e| matches!(e, DomainEvent::AttendanceCreated(_)))
            .count();
        assert_eq!(created, 2);
    }

    #[tokio::test]
    async fn test_auto_suspended_and_pending_allocations() {
        let fixture = Fixture::new();
        let away = fixture.allocation_with_status("A1234BC", AllocationStatus::AutoSuspended);
        fixture.pending_allocation("B2345CD", date(2024, 1, 1));
        let session = fixture.session(date(2024, 3, 1), 9);

        CreateAttendances::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 2)))
            .await
            .unwrap();

        let records = fixture.store.attendances_for_session(session);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prisoner_number, away.prisoner_number);
        assert_eq!(records[0].reason, Some(AttendanceReason::AutoSuspended));
    }

    #[tokio::test]
    async fn test_expire_announces_yesterdays_waiting_records() {
        let fixture = Fixture::new();
        let allocation = fixture.allocation_with_status("A1234BC", AllocationStatus::Active);
        let unmarked = fixture.waiting_attendance(&allocation, date(2024, 2, 29), 9);
        fixture.waiting_attendance(&allocation, date(2024, 3, 1), 9);

        let report = ExpireAttendances::new(fixture.deps())
            .run(&fixture.ctx(date(2024, 3, 1), at(2024, 3, 1, 2)))
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(
            fixture.outbox.events(),
            vec![DomainEvent::AttendanceExpired(unmarked)]
        );
        assert!(fixture.store.attendance(unmarked).unwrap().is_waiting());
    }
}
