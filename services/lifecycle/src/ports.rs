//! Storage, queue and collaborator seams.
//!
//! Steps, the coordinator and the handlers only see these traits. Postgres and
//! HTTP implementations live in [`crate::db`] and [`crate::clients`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regime_domain::{
    ActivitySchedule, Allocation, AllocationStatus, Attendance, Job, Movement, Pipeline,
    PrisonerSnapshot, ScheduledSession, SessionAttendance, WaitingListApplication,
};
use regime_events::{DomainEvent, EventEnvelope, JobType, QueueMessage};
use regime_id::{ActivityScheduleId, AllocationId, AttendanceId, JobId, PrisonCode, PrisonerNumber, ScheduledInstanceId};

use crate::clients::ClientError;
use crate::db::DbError;

// =============================================================================
// Change sets
// =============================================================================

/// Everything one unit of work changes. Committed in a single transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub allocations: Vec<Allocation>,
    pub updated_attendances: Vec<Attendance>,
    pub new_attendances: Vec<Attendance>,
    pub waiting_list: Vec<WaitingListApplication>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
            && self.updated_attendances.is_empty()
            && self.new_attendances.is_empty()
            && self.waiting_list.is_empty()
    }

    /// Adds the attendances named in `changed` from `records`.
    pub fn touch_attendances(&mut self, records: &[SessionAttendance], changed: &[AttendanceId]) {
        self.updated_attendances.extend(
            records
                .iter()
                .filter(|r| changed.contains(&r.attendance.attendance_id))
                .map(|r| r.attendance.clone()),
        );
    }

    /// The events owed once this change set is committed.
    ///
    /// `inserted` is the subset of `new_attendances` the store actually wrote.
    pub fn events(&self, inserted: &[AttendanceId]) -> Vec<DomainEvent> {
        let allocations = self
            .allocations
            .iter()
            .map(|a| DomainEvent::AllocationAmended(a.allocation_id));
        let amended = self
            .updated_attendances
            .iter()
            .map(|a| DomainEvent::AttendanceAmended(a.attendance_id));
        let created = inserted.iter().copied().map(DomainEvent::AttendanceCreated);
        allocations.chain(amended).chain(created).collect()
    }
}

/// Per-site settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub prison_code: PrisonCode,
    pub rolled_out: bool,
    pub max_days_to_expiry: u32,
}

// =============================================================================
// Stores
// =============================================================================

#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn allocations_by_status(
        &self,
        prison: &PrisonCode,
        statuses: &[AllocationStatus],
    ) -> Result<Vec<Allocation>, DbError>;

    async fn allocations_by_ids(&self, ids: &[AllocationId]) -> Result<Vec<Allocation>, DbError>;

    /// Non-ended allocations for one person at one prison.
    async fn allocations_for_prisoner(
        &self,
        prison: &PrisonCode,
        prisoner: &PrisonerNumber,
    ) -> Result<Vec<Allocation>, DbError>;

    /// Non-ended allocations on one schedule.
    async fn allocations_for_schedule(
        &self,
        schedule: ActivityScheduleId,
    ) -> Result<Vec<Allocation>, DbError>;

    async fn schedules_ending_by(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ActivitySchedule>, DbError>;

    async fn sessions_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledSession>, DbError>;

    /// The allocation's attendances on sessions dated `from` or later.
    async fn attendances_from(
        &self,
        allocation: &Allocation,
        from: NaiveDate,
    ) -> Result<Vec<SessionAttendance>, DbError>;

    /// People who already have an attendance for the session.
    async fn attendees(
        &self,
        session: ScheduledInstanceId,
    ) -> Result<HashSet<PrisonerNumber>, DbError>;

    /// WAITING attendances on sessions at `prison` dated `date`.
    async fn waiting_attendances_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceId>, DbError>;

    /// PENDING and APPROVED applications at `prison`.
    async fn open_waiting_list(
        &self,
        prison: &PrisonCode,
    ) -> Result<Vec<WaitingListApplication>, DbError>;

    /// Writes the change set atomically. Returns the ids of the new
    /// attendances that were inserted; one that collides with an existing
    /// (session, person) pair is skipped.
    async fn commit(&self, changes: &ChangeSet) -> Result<Vec<AttendanceId>, DbError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), DbError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, DbError>;

    /// Sets the sub-task total once. A zero total succeeds the job.
    async fn initialise_counts(&self, job_id: JobId, total: u32) -> Result<(), DbError>;

    /// Atomically counts the sub-task for `prison_code` as completed. `true`
    /// for exactly the one call that brings the count to the total. A site
    /// that was already counted is not counted again and yields `false`.
    async fn increment_count(
        &self,
        job_id: JobId,
        prison_code: &PrisonCode,
    ) -> Result<bool, DbError>;

    async fn fail(&self, job_id: JobId) -> Result<(), DbError>;

    /// When a job of this type was last started.
    async fn last_started(&self, job_type: JobType) -> Result<Option<DateTime<Utc>>, DbError>;

    /// Claims the run of `pipeline` for `run_date`. `true` only for the first
    /// caller for that pair.
    async fn claim_pipeline_run(
        &self,
        pipeline: Pipeline,
        run_date: NaiveDate,
    ) -> Result<bool, DbError>;
}

#[async_trait]
pub trait SiteConfigStore: Send + Sync {
    async fn rolled_out(&self) -> Result<Vec<SiteConfig>, DbError>;

    async fn site(&self, prison: &PrisonCode) -> Result<Option<SiteConfig>, DbError>;
}

// =============================================================================
// Queue and events
// =============================================================================

/// A claimed queue message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_id: i64,
    pub attempts: i32,
    pub message: QueueMessage,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues all messages or none.
    async fn publish(&self, messages: &[QueueMessage]) -> Result<(), DbError>;

    /// Claims up to `max` visible messages.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, DbError>;

    async fn ack(&self, delivery_id: i64) -> Result<(), DbError>;
}

#[async_trait]
pub trait OutboundEvents: Send + Sync {
    async fn append(&self, envelopes: &[EventEnvelope]) -> Result<(), DbError>;
}

// =============================================================================
// Collaborators
// =============================================================================

#[async_trait]
pub trait PrisonerSearch: Send + Sync {
    async fn find_by_prisoner_numbers(
        &self,
        numbers: &[PrisonerNumber],
    ) -> Result<Vec<PrisonerSnapshot>, ClientError>;
}

#[async_trait]
pub trait MovementHistory: Send + Sync {
    async fn movements_for(&self, numbers: &[PrisonerNumber]) -> Result<Vec<Movement>, ClientError>;
}
