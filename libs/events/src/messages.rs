//! Queue message schema.
//!
//! A queue message is either one per-site sub-task of a distributed job or an
//! inbound prisoner movement.

use chrono::{DateTime, NaiveDate, Utc};
use regime_id::{JobId, PrisonCode, PrisonerNumber};
use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Job Types
// =============================================================================

/// A distributed job phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Allocate,
    StartSuspensions,
    EndSuspensions,
    DeallocateEnding,
    DeallocateExpiring,
    AttendanceCreate,
    AttendanceExpire,
}

impl JobType {
    /// Every job type, in declaration order.
    pub const ALL: [JobType; 7] = [
        JobType::Allocate,
        JobType::StartSuspensions,
        JobType::EndSuspensions,
        JobType::DeallocateEnding,
        JobType::DeallocateExpiring,
        JobType::AttendanceCreate,
        JobType::AttendanceExpire,
    ];

    /// The stored/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Allocate => "ALLOCATE",
            JobType::StartSuspensions => "START_SUSPENSIONS",
            JobType::EndSuspensions => "END_SUSPENSIONS",
            JobType::DeallocateEnding => "DEALLOCATE_ENDING",
            JobType::DeallocateExpiring => "DEALLOCATE_EXPIRING",
            JobType::AttendanceCreate => "ATTENDANCE_CREATE",
            JobType::AttendanceExpire => "ATTENDANCE_EXPIRE",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|job_type| job_type.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType(s.to_string()))
    }
}

// =============================================================================
// Site Job Messages
// =============================================================================

/// Phase-specific flags carried alongside a job message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobFlags {
    /// Chain attendance expiry after attendance creation.
    pub with_expiry: bool,
}

/// One site's sub-task of a distributed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteJobMessage {
    pub job_id: JobId,
    pub job_type: JobType,
    pub prison_code: PrisonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub flags: JobFlags,
}

// =============================================================================
// Movement Messages
// =============================================================================

/// The kind of custody movement reported for a prisoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Temporarily away: court, hospital, temporary absence.
    TemporarilyReleased,
    /// Received into (or back into) a prison.
    Received,
    /// Permanently released from custody.
    Released,
}

/// A prisoner movement affecting allocations at one prison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrisonerMovementMessage {
    pub kind: MovementKind,
    pub prison_code: PrisonCode,
    pub prisoner_number: PrisonerNumber,
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Queue Message
// =============================================================================

/// Everything that can arrive on the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueMessage {
    SiteJob(SiteJobMessage),
    PrisonerMovement(PrisonerMovementMessage),
}

impl QueueMessage {
    /// Short label used in logs.
    pub fn label(&self) -> String {
        match self {
            QueueMessage::SiteJob(job) => format!("{}:{}", job.job_type, job.prison_code),
            QueueMessage::PrisonerMovement(movement) => {
                format!("{:?}:{}", movement.kind, movement.prisoner_number)
            }
        }
    }
}

impl From<SiteJobMessage> for QueueMessage {
    fn from(message: SiteJobMessage) -> Self {
        QueueMessage::SiteJob(message)
    }
}

impl From<PrisonerMovementMessage> for QueueMessage {
    fn from(message: PrisonerMovementMessage) -> Self {
        QueueMessage::PrisonerMovement(message)
    }
}

// =============================================================================
// Tests
// =============================================================================
