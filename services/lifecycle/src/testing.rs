//! In-memory stores and collaborators for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regime_domain::{
    ActivitySchedule, Allocation, AllocationStatus, Attendance, AttendanceReason, CustodyStatus,
    Job, Movement, Pipeline, PrisonerSnapshot, ScheduledSession, SessionAttendance, TimeSlot,
    WaitingListApplication, WaitingListStatus, SYSTEM_ACTOR,
};
use regime_events::{DomainEvent, EventEnvelope, JobType, QueueMessage};
use regime_id::{
    ActivityScheduleId, AllocationId, AttendanceId, JobId, PrisonCode, PrisonerNumber,
    ScheduledInstanceId, WaitingListId,
};

use crate::clients::ClientError;
use crate::db::DbError;
use crate::events::EventPublisher;
use crate::jobs::{SiteContext, StepDeps};
use crate::monitoring::{Failure, MonitoringSink};
use crate::ports::{
    ChangeSet, Delivery, JobQueue, JobStore, LifecycleStore, MovementHistory, OutboundEvents,
    PrisonerSearch, SiteConfig, SiteConfigStore,
};
use crate::unit_of_work::UnitOfWork;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

fn unavailable() -> DbError {
    DbError::Query(sqlx::Error::PoolTimedOut)
}

// =============================================================================
// Lifecycle store
// =============================================================================

#[derive(Default)]
struct LifecycleData {
    schedules: Vec<ActivitySchedule>,
    sessions: Vec<ScheduledSession>,
    allocations: BTreeMap<AllocationId, Allocation>,
    attendances: Vec<Attendance>,
    waiting_list: Vec<WaitingListApplication>,
}

impl LifecycleData {
    fn session(&self, id: ScheduledInstanceId) -> Option<&ScheduledSession> {
        self.sessions
            .iter()
            .find(|s| s.scheduled_instance_id == id)
    }
}

#[derive(Default)]
pub(crate) struct MemoryLifecycleStore {
    data: Mutex<LifecycleData>,
}

impl MemoryLifecycleStore {
    pub(crate) fn put_allocation(&self, allocation: Allocation) {
        let mut data = self.data.lock().unwrap();
        data.allocations.insert(allocation.allocation_id, allocation);
    }

    pub(crate) fn put_schedule(&self, schedule: ActivitySchedule) {
        let mut data = self.data.lock().unwrap();
        data.schedules
            .retain(|s| s.activity_schedule_id != schedule.activity_schedule_id);
        data.schedules.push(schedule);
    }

    pub(crate) fn put_session(&self, session: ScheduledSession) {
        self.data.lock().unwrap().sessions.push(session);
    }

    pub(crate) fn put_attendance(&self, attendance: Attendance) {
        self.data.lock().unwrap().attendances.push(attendance);
    }

    pub(crate) fn put_waiting_list_entry(&self, application: WaitingListApplication) {
        self.data.lock().unwrap().waiting_list.push(application);
    }

    pub(crate) fn allocation(&self, id: AllocationId) -> Option<Allocation> {
        self.data.lock().unwrap().allocations.get(&id).cloned()
    }

    pub(crate) fn attendance(&self, id: AttendanceId) -> Option<Attendance> {
        self.data
            .lock()
            .unwrap()
            .attendances
            .iter()
            .find(|a| a.attendance_id == id)
            .cloned()
    }

    pub(crate) fn attendances_for_session(&self, id: ScheduledInstanceId) -> Vec<Attendance> {
        self.data
            .lock()
            .unwrap()
            .attendances
            .iter()
            .filter(|a| a.scheduled_instance_id == id)
            .cloned()
            .collect()
    }

    pub(crate) fn waiting_list_entry(&self, id: WaitingListId) -> Option<WaitingListApplication> {
        self.data
            .lock()
            .unwrap()
            .waiting_list
            .iter()
            .find(|w| w.waiting_list_id == id)
            .cloned()
    }
}

#[async_trait]
impl LifecycleStore for MemoryLifecycleStore {
    async fn allocations_by_status(
        &self,
        prison: &PrisonCode,
        statuses: &[AllocationStatus],
    ) -> Result<Vec<Allocation>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .allocations
            .values()
            .filter(|a| &a.prison_code == prison && statuses.contains(&a.status))
            .cloned()
            .collect())
    }

    async fn allocations_by_ids(&self, ids: &[AllocationId]) -> Result<Vec<Allocation>, DbError> {
        let data = self.data.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| data.allocations.get(id).cloned())
            .collect())
    }

    async fn allocations_for_prisoner(
        &self,
        prison: &PrisonCode,
        prisoner: &PrisonerNumber,
    ) -> Result<Vec<Allocation>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .allocations
            .values()
            .filter(|a| {
                &a.prison_code == prison && &a.prisoner_number == prisoner && !a.is_ended()
            })
            .cloned()
            .collect())
    }

    async fn allocations_for_schedule(
        &self,
        schedule: ActivityScheduleId,
    ) -> Result<Vec<Allocation>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .allocations
            .values()
            .filter(|a| a.activity_schedule_id == schedule && !a.is_ended())
            .cloned()
            .collect())
    }

    async fn schedules_ending_by(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ActivitySchedule>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .schedules
            .iter()
            .filter(|s| &s.prison_code == prison && s.ends_on_or_before(date))
            .cloned()
            .collect())
    }

    async fn sessions_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledSession>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| &s.prison_code == prison && s.session_date == date)
            .cloned()
            .collect())
    }

    async fn attendances_from(
        &self,
        allocation: &Allocation,
        from: NaiveDate,
    ) -> Result<Vec<SessionAttendance>, DbError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .attendances
            .iter()
            .filter(|a| a.prisoner_number == allocation.prisoner_number)
            .filter_map(|a| {
                let session = data.session(a.scheduled_instance_id)?;
                (session.activity_schedule_id == allocation.activity_schedule_id
                    && session.session_date >= from)
                    .then(|| SessionAttendance {
                        session: session.clone(),
                        attendance: a.clone(),
                    })
            })
            .collect())
    }

    async fn attendees(
        &self,
        session: ScheduledInstanceId,
    ) -> Result<HashSet<PrisonerNumber>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .attendances
            .iter()
            .filter(|a| a.scheduled_instance_id == session)
            .map(|a| a.prisoner_number.clone())
            .collect())
    }

    async fn waiting_attendances_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceId>, DbError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .attendances
            .iter()
            .filter(|a| a.is_waiting())
            .filter(|a| {
                data.session(a.scheduled_instance_id)
                    .is_some_and(|s| &s.prison_code == prison && s.session_date == date)
            })
            .map(|a| a.attendance_id)
            .collect())
    }

    async fn open_waiting_list(
        &self,
        prison: &PrisonCode,
    ) -> Result<Vec<WaitingListApplication>, DbError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .waiting_list
            .iter()
            .filter(|w| &w.prison_code == prison && w.status.is_open())
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<Vec<AttendanceId>, DbError> {
        let mut data = self.data.lock().unwrap();

        for allocation in &changes.allocations {
            data.allocations
                .insert(allocation.allocation_id, allocation.clone());
        }
        for updated in &changes.updated_attendances {
            if let Some(existing) = data
                .attendances
                .iter_mut()
                .find(|a| a.attendance_id == updated.attendance_id && !a.finalised)
            {
                *existing = updated.clone();
            }
        }

        let mut inserted = Vec::new();
        for attendance in &changes.new_attendances {
            let exists = data.attendances.iter().any(|a| {
                a.scheduled_instance_id == attendance.scheduled_instance_id
                    && a.prisoner_number == attendance.prisoner_number
            });
            if !exists {
                data.attendances.push(attendance.clone());
                inserted.push(attendance.attendance_id);
            }
        }

        for application in &changes.waiting_list {
            if let Some(existing) = data
                .waiting_list
                .iter_mut()
                .find(|w| w.waiting_list_id == application.waiting_list_id)
            {
                *existing = application.clone();
            }
        }

        Ok(inserted)
    }
}

// =============================================================================
// Jobs, queue and sites
// =============================================================================

#[derive(Default)]
pub(crate) struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
    counted: Mutex<HashSet<(JobId, PrisonCode)>>,
    runs: Mutex<HashSet<(Pipeline, NaiveDate)>>,
    fail_increments: AtomicBool,
}

impl MemoryJobStore {
    pub(crate) fn job(&self, id: JobId) -> Option<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.job_id == id)
            .cloned()
    }

    pub(crate) fn count_of(&self, job_type: JobType) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.job_type == job_type)
            .count()
    }

    pub(crate) fn latest(&self, job_type: JobType) -> Option<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|j| j.job_type == job_type)
            .cloned()
    }

    pub(crate) fn fail_increments(&self) {
        self.fail_increments.store(true, Ordering::SeqCst);
    }

    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, regime_domain::JobStateError>,
    ) -> Result<T, DbError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.job_id == id)
            .ok_or(DbError::JobNotFound(id))?;
        Ok(f(job)?)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), DbError> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, DbError> {
        Ok(self.job(job_id))
    }

    async fn initialise_counts(&self, job_id: JobId, total: u32) -> Result<(), DbError> {
        self.with_job(job_id, |job| job.initialise_counts(total, Utc::now()))
    }

    async fn increment_count(
        &self,
        job_id: JobId,
        prison_code: &PrisonCode,
    ) -> Result<bool, DbError> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let key = (job_id, prison_code.clone());
        if self.counted.lock().unwrap().contains(&key) {
            return self.with_job(job_id, |_| Ok(false));
        }
        let completed = self.with_job(job_id, |job| job.record_completion(Utc::now()))?;
        self.counted.lock().unwrap().insert(key);
        Ok(completed)
    }

    async fn fail(&self, job_id: JobId) -> Result<(), DbError> {
        self.with_job(job_id, |job| job.fail(Utc::now()))
    }

    async fn last_started(&self, job_type: JobType) -> Result<Option<DateTime<Utc>>, DbError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.job_type == job_type)
            .map(|j| j.started_at)
            .max())
    }

    async fn claim_pipeline_run(
        &self,
        pipeline: Pipeline,
        run_date: NaiveDate,
    ) -> Result<bool, DbError> {
        Ok(self.runs.lock().unwrap().insert((pipeline, run_date)))
    }
}

struct QueuedMessage {
    delivery_id: i64,
    attempts: i32,
    claimed: bool,
    message: QueueMessage,
}

#[derive(Default)]
struct QueueData {
    next_id: i64,
    messages: Vec<QueuedMessage>,
    published: Vec<QueueMessage>,
}

/// Claimed messages stay invisible until acked.
#[derive(Default)]
pub(crate) struct MemoryQueue {
    data: Mutex<QueueData>,
    fail_publishes: AtomicBool,
}

impl MemoryQueue {
    pub(crate) fn published(&self) -> Vec<QueueMessage> {
        self.data.lock().unwrap().published.clone()
    }

    pub(crate) fn fail_publishes(&self) {
        self.fail_publishes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.data.lock().unwrap().messages.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points every queued site job at `prison`.
    pub(crate) fn rewrite_site_jobs(&self, prison: &str) {
        let prison = PrisonCode::parse(prison).unwrap();
        for queued in &mut self.data.lock().unwrap().messages {
            if let QueueMessage::SiteJob(job) = &mut queued.message {
                job.prison_code = prison.clone();
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn publish(&self, messages: &[QueueMessage]) -> Result<(), DbError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut data = self.data.lock().unwrap();
        for message in messages {
            data.next_id += 1;
            let delivery_id = data.next_id;
            data.messages.push(QueuedMessage {
                delivery_id,
                attempts: 0,
                claimed: false,
                message: message.clone(),
            });
            data.published.push(message.clone());
        }
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, DbError> {
        let mut data = self.data.lock().unwrap();
        Ok(data
            .messages
            .iter_mut()
            .filter(|m| !m.claimed)
            .take(max)
            .map(|m| {
                m.claimed = true;
                m.attempts += 1;
                Delivery {
                    delivery_id: m.delivery_id,
                    attempts: m.attempts,
                    message: m.message.clone(),
                }
            })
            .collect())
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), DbError> {
        self.data
            .lock()
            .unwrap()
            .messages
            .retain(|m| m.delivery_id != delivery_id);
        Ok(())
    }
}

pub(crate) struct StaticSites {
    sites: Vec<SiteConfig>,
}

impl StaticSites {
    pub(crate) fn rolled_out(codes: &[&str]) -> Self {
        Self {
            sites: codes
                .iter()
                .map(|code| SiteConfig {
                    prison_code: PrisonCode::parse(code).unwrap(),
                    rolled_out: true,
                    max_days_to_expiry: 21,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SiteConfigStore for StaticSites {
    async fn rolled_out(&self) -> Result<Vec<SiteConfig>, DbError> {
        Ok(self.sites.iter().filter(|s| s.rolled_out).cloned().collect())
    }

    async fn site(&self, prison: &PrisonCode) -> Result<Option<SiteConfig>, DbError> {
        Ok(self.sites.iter().find(|s| &s.prison_code == prison).cloned())
    }
}

// =============================================================================
// Events and monitoring
// =============================================================================

#[derive(Default)]
pub(crate) struct MemoryOutbox {
    envelopes: Mutex<Vec<EventEnvelope>>,
}

impl MemoryOutbox {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        self.envelopes
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.domain_event().unwrap())
            .collect()
    }
}

#[async_trait]
impl OutboundEvents for MemoryOutbox {
    async fn append(&self, envelopes: &[EventEnvelope]) -> Result<(), DbError> {
        self.envelopes.lock().unwrap().extend_from_slice(envelopes);
        Ok(())
    }
}

pub(crate) struct FailingOutbox;

#[async_trait]
impl OutboundEvents for FailingOutbox {
    async fn append(&self, _envelopes: &[EventEnvelope]) -> Result<(), DbError> {
        Err(unavailable())
    }
}

#[derive(Default)]
pub(crate) struct RecordingMonitor {
    failures: Mutex<Vec<Failure>>,
}

impl RecordingMonitor {
    pub(crate) fn failures(&self) -> Vec<Failure> {
        self.failures.lock().unwrap().clone()
    }

    pub(crate) fn site_failures(&self) -> usize {
        self.failures()
            .iter()
            .filter(|f| matches!(f, Failure::SiteStep { .. }))
            .count()
    }
}

impl MonitoringSink for RecordingMonitor {
    fn capture(&self, failure: Failure) {
        self.failures.lock().unwrap().push(failure);
    }
}

// =============================================================================
// Collaborators
// =============================================================================

#[derive(Default)]
pub(crate) struct StaticPrisonerSearch {
    snapshots: Mutex<Vec<PrisonerSnapshot>>,
    down: AtomicBool,
}

impl StaticPrisonerSearch {
    pub(crate) fn set(&self, snapshots: Vec<PrisonerSnapshot>) {
        *self.snapshots.lock().unwrap() = snapshots;
    }

    pub(crate) fn fail(&self) {
        self.down.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PrisonerSearch for StaticPrisonerSearch {
    async fn find_by_prisoner_numbers(
        &self,
        numbers: &[PrisonerNumber],
    ) -> Result<Vec<PrisonerSnapshot>, ClientError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                service: "prisoner-search",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| numbers.contains(&s.prisoner_number))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct StaticMovements {
    movements: Mutex<Vec<Movement>>,
}

impl StaticMovements {
    pub(crate) fn set(&self, movements: Vec<Movement>) {
        *self.movements.lock().unwrap() = movements;
    }
}

#[async_trait]
impl MovementHistory for StaticMovements {
    async fn movements_for(&self, numbers: &[PrisonerNumber]) -> Result<Vec<Movement>, ClientError> {
        Ok(self
            .movements
            .lock()
            .unwrap()
            .iter()
            .filter(|m| numbers.contains(&m.prisoner_number))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Fixture
// =============================================================================

/// One site (MDI) with one activity schedule and in-memory everything.
pub(crate) struct Fixture {
    pub store: Arc<MemoryLifecycleStore>,
    pub outbox: Arc<MemoryOutbox>,
    pub prisoners: Arc<StaticPrisonerSearch>,
    pub movements: Arc<StaticMovements>,
    pub monitor: Arc<RecordingMonitor>,
    schedule: ActivitySchedule,
    max_days_to_expiry: u32,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_expiry_days(21)
    }

    pub(crate) fn with_expiry_days(max_days_to_expiry: u32) -> Self {
        let schedule = ActivitySchedule {
            activity_schedule_id: ActivityScheduleId::new(),
            prison_code: PrisonCode::parse("MDI").unwrap(),
            description: "Woodwork".to_string(),
            start_date: date(2024, 1, 1),
            end_date: None,
        };
        let store = Arc::new(MemoryLifecycleStore::default());
        store.put_schedule(schedule.clone());

        Self {
            store,
            outbox: Arc::new(MemoryOutbox::default()),
            prisoners: Arc::new(StaticPrisonerSearch::default()),
            movements: Arc::new(StaticMovements::default()),
            monitor: Arc::new(RecordingMonitor::default()),
            schedule,
            max_days_to_expiry,
        }
    }

    pub(crate) fn prison(&self) -> PrisonCode {
        self.schedule.prison_code.clone()
    }

    pub(crate) fn work(&self) -> UnitOfWork {
        UnitOfWork::new(
            self.store.clone(),
            EventPublisher::new(self.outbox.clone()),
        )
    }

    pub(crate) fn deps(&self) -> StepDeps {
        StepDeps {
            work: self.work(),
            prisoners: self.prisoners.clone(),
            movements: self.movements.clone(),
            monitor: self.monitor.clone(),
        }
    }

    pub(crate) fn ctx(&self, date: NaiveDate, now: NaiveDateTime) -> SiteContext {
        SiteContext {
            prison_code: self.prison(),
            date,
            now,
            flags: Default::default(),
            site: SiteConfig {
                prison_code: self.prison(),
                rolled_out: true,
                max_days_to_expiry: self.max_days_to_expiry,
            },
        }
    }

    pub(crate) fn pending_allocation(&self, prisoner: &str, start: NaiveDate) -> Allocation {
        let allocation = Allocation::pending(
            self.prison(),
            self.schedule.activity_schedule_id,
            PrisonerNumber::parse(prisoner).unwrap(),
            start,
            None,
            Some("LOW".to_string()),
            "staff",
            at(2023, 12, 20, 9),
        )
        .unwrap();
        self.store.put_allocation(allocation.clone());
        allocation
    }

    pub(crate) fn allocation_with_status(&self, prisoner: &str, status: AllocationStatus) -> Allocation {
        let mut allocation = self.pending_allocation(prisoner, date(2024, 1, 1));
        allocation.status = status;
        self.store.put_allocation(allocation.clone());
        allocation
    }

    pub(crate) fn end_schedule(&self, end: NaiveDate) {
        let mut schedule = self.schedule.clone();
        schedule.end_date = Some(end);
        self.store.put_schedule(schedule);
    }

    pub(crate) fn session(&self, day: NaiveDate, hour: u32) -> ScheduledInstanceId {
        let session = ScheduledSession {
            scheduled_instance_id: ScheduledInstanceId::new(),
            activity_schedule_id: self.schedule.activity_schedule_id,
            prison_code: self.prison(),
            session_date: day,
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 2, 0, 0).unwrap(),
            time_slot: if hour < 12 { TimeSlot::Am } else { TimeSlot::Pm },
            cancellation: None,
        };
        let id = session.scheduled_instance_id;
        self.store.put_session(session);
        id
    }

    pub(crate) fn waiting_attendance(
        &self,
        allocation: &Allocation,
        day: NaiveDate,
        hour: u32,
    ) -> AttendanceId {
        let session = self.session(day, hour);
        let attendance = Attendance::waiting(session, allocation.prisoner_number.clone());
        let id = attendance.attendance_id;
        self.store.put_attendance(attendance);
        id
    }

    pub(crate) fn suspended_attendance(
        &self,
        allocation: &Allocation,
        day: NaiveDate,
        hour: u32,
        reason: AttendanceReason,
    ) -> AttendanceId {
        let session = self.session(day, hour);
        let mut attendance = Attendance::waiting(session, allocation.prisoner_number.clone());
        attendance.complete(reason, false, SYSTEM_ACTOR, at(2024, 1, 1, 0));
        let id = attendance.attendance_id;
        self.store.put_attendance(attendance);
        id
    }

    pub(crate) fn waiting_list_entry(&self, prisoner: &str, status: WaitingListStatus) -> WaitingListId {
        let application = WaitingListApplication {
            waiting_list_id: WaitingListId::new(),
            prison_code: self.prison(),
            prisoner_number: PrisonerNumber::parse(prisoner).unwrap(),
            activity_schedule_id: self.schedule.activity_schedule_id,
            status,
        };
        let id = application.waiting_list_id;
        self.store.put_waiting_list_entry(application);
        id
    }

    pub(crate) fn snapshot(&self, prisoner: &str, status: CustodyStatus) -> PrisonerSnapshot {
        PrisonerSnapshot {
            prisoner_number: PrisonerNumber::parse(prisoner).unwrap(),
            prison_code: Some(self.prison()),
            status,
        }
    }

    pub(crate) fn movement(&self, prisoner: &str, moved_at: NaiveDateTime) -> Movement {
        Movement {
            prisoner_number: PrisonerNumber::parse(prisoner).unwrap(),
            movement_type: "TAP".to_string(),
            movement_date: moved_at.date(),
            movement_time: moved_at.time(),
            from_prison: Some(self.prison()),
            to_prison: None,
        }
    }
}
