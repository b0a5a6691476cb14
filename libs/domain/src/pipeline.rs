//! Job pipelines.
//!
//! Each pipeline is an ordered list of phases. A phase starts when the job for
//! the phase before it succeeds, subject to the stage's condition.

use regime_events::{JobFlags, JobType};
use serde::{Deserialize, Serialize};

/// When a chained phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCondition {
    Always,
    /// Only when the triggering job carried `with_expiry`.
    WithExpiry,
}

impl StageCondition {
    pub fn holds(&self, flags: JobFlags) -> bool {
        match self {
            StageCondition::Always => true,
            StageCondition::WithExpiry => flags.with_expiry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pipeline {
    ManageAllocations,
    Deallocations,
    ManageAttendances,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [
        Pipeline::ManageAllocations,
        Pipeline::Deallocations,
        Pipeline::ManageAttendances,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::ManageAllocations => "MANAGE_ALLOCATIONS",
            Pipeline::Deallocations => "DEALLOCATIONS",
            Pipeline::ManageAttendances => "MANAGE_ATTENDANCES",
        }
    }

    /// The phases in order, each with the condition for running it.
    pub fn phases(&self) -> &'static [(JobType, StageCondition)] {
        match self {
            Pipeline::ManageAllocations => &[
                (JobType::Allocate, StageCondition::Always),
                (JobType::StartSuspensions, StageCondition::Always),
                (JobType::EndSuspensions, StageCondition::Always),
            ],
            Pipeline::Deallocations => &[
                (JobType::DeallocateEnding, StageCondition::Always),
                (JobType::DeallocateExpiring, StageCondition::Always),
            ],
            Pipeline::ManageAttendances => &[
                (JobType::AttendanceCreate, StageCondition::Always),
                (JobType::AttendanceExpire, StageCondition::WithExpiry),
            ],
        }
    }

    pub fn first(&self) -> JobType {
        self.phases()[0].0
    }

    /// The pipeline a job type belongs to. Every job type belongs to exactly one.
    pub fn containing(job_type: JobType) -> Pipeline {
        match job_type {
            JobType::Allocate | JobType::StartSuspensions | JobType::EndSuspensions => {
                Pipeline::ManageAllocations
            }
            JobType::DeallocateEnding | JobType::DeallocateExpiring => Pipeline::Deallocations,
            JobType::AttendanceCreate | JobType::AttendanceExpire => Pipeline::ManageAttendances,
        }
    }

    /// The phase to start once a `job_type` job succeeds, if any.
    pub fn next_after(job_type: JobType, flags: JobFlags) -> Option<JobType> {
        let phases = Pipeline::containing(job_type).phases();
        let position = phases.iter().position(|(phase, _)| *phase == job_type)?;
        phases
            .get(position + 1)
            .filter(|(_, condition)| condition.holds(flags))
            .map(|(phase, _)| *phase)
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pipeline::ALL
            .into_iter()
            .find(|pipeline| pipeline.as_str() == s)
            .ok_or_else(|| format!("unknown pipeline: {s}"))
    }
}
