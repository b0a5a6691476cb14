//! Per-site steps, one per job type.
//!
//! Each step works on one site at a time and commits each allocation (or
//! session) in its own transaction. A record that fails is reported to the
//! monitoring sink and skipped; the rest of the site carries on.

mod allocate;
mod attendances;
mod deallocate;
mod suspensions;

pub use allocate::ActivatePending;
pub(crate) use allocate::{ABSENT_REASON, PLANNED_REASON};
pub use attendances::{CreateAttendances, ExpireAttendances};
pub use deallocate::{DeallocateEnding, DeallocateExpiring};
pub use suspensions::{EndSuspensions, StartSuspensions};

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use regime_events::{JobFlags, JobType};
use regime_id::PrisonCode;

use super::JobError;
use crate::error::LifecycleError;
use crate::monitoring::{Failure, MonitoringSink};
use crate::ports::{MovementHistory, PrisonerSearch, SiteConfig};
use crate::unit_of_work::UnitOfWork;

/// What a step runs against.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub prison_code: PrisonCode,
    /// The business date the job was started for.
    pub date: NaiveDate,
    /// Local wall-clock time the step runs at.
    pub now: NaiveDateTime,
    pub flags: JobFlags,
    pub site: SiteConfig,
}

/// Counts for one step run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub processed: usize,
    pub changed: usize,
    pub failed: usize,
}

#[async_trait]
pub trait SiteStep: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn run(&self, ctx: &SiteContext) -> Result<StepReport, JobError>;
}

/// Collaborators shared by every step.
#[derive(Clone)]
pub struct StepDeps {
    pub work: UnitOfWork,
    pub prisoners: Arc<dyn PrisonerSearch>,
    pub movements: Arc<dyn MovementHistory>,
    pub monitor: Arc<dyn MonitoringSink>,
}

impl StepDeps {
    /// Folds one record's outcome into `report`.
    ///
    /// `Ok(true)` means the record changed. Failures go to the monitor.
    pub(crate) fn tally(
        &self,
        report: &mut StepReport,
        ctx: &SiteContext,
        job_type: JobType,
        record: impl Display,
        outcome: Result<bool, LifecycleError>,
    ) {
        report.processed += 1;
        match outcome {
            Ok(true) => report.changed += 1,
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                self.monitor.capture(Failure::Record {
                    job_type,
                    prison_code: ctx.prison_code.clone(),
                    record: record.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Every step, keyed by job type.
pub struct SiteSteps {
    allocate: ActivatePending,
    start_suspensions: StartSuspensions,
    end_suspensions: EndSuspensions,
    deallocate_ending: DeallocateEnding,
    deallocate_expiring: DeallocateExpiring,
    create_attendances: CreateAttendances,
    expire_attendances: ExpireAttendances,
}

impl SiteSteps {
    pub fn new(deps: StepDeps) -> Self {
        Self {
            allocate: ActivatePending::new(deps.clone()),
            start_suspensions: StartSuspensions::new(deps.clone()),
            end_suspensions: EndSuspensions::new(deps.clone()),
            deallocate_ending: DeallocateEnding::new(deps.clone()),
            deallocate_expiring: DeallocateExpiring::new(deps.clone()),
            create_attendances: CreateAttendances::new(deps.clone()),
            expire_attendances: ExpireAttendances::new(deps),
        }
    }

    pub fn step(&self, job_type: JobType) -> &dyn SiteStep {
        match job_type {
            JobType::Allocate => &self.allocate,
            JobType::StartSuspensions => &self.start_suspensions,
            JobType::EndSuspensions => &self.end_suspensions,
            JobType::DeallocateEnding => &self.deallocate_ending,
            JobType::DeallocateExpiring => &self.deallocate_expiring,
            JobType::AttendanceCreate => &self.create_attendances,
            JobType::AttendanceExpire => &self.expire_attendances,
        }
    }
}
