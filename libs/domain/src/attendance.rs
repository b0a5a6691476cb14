//! Scheduled sessions and the attendance records they produce.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regime_id::{ActivityScheduleId, AttendanceId, PrisonCode, PrisonerNumber, ScheduledInstanceId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeSlot {
    Am,
    Pm,
    Ed,
}

impl TimeSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Am => "AM",
            TimeSlot::Pm => "PM",
            TimeSlot::Ed => "ED",
        }
    }
}

impl std::str::FromStr for TimeSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AM" => Ok(TimeSlot::Am),
            "PM" => Ok(TimeSlot::Pm),
            "ED" => Ok(TimeSlot::Ed),
            other => Err(format!("unknown time slot: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCancellation {
    pub reason: String,
    pub issue_payment: bool,
}

/// One occurrence of an activity schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub scheduled_instance_id: ScheduledInstanceId,
    pub activity_schedule_id: ActivityScheduleId,
    pub prison_code: PrisonCode,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_slot: TimeSlot,
    pub cancellation: Option<SessionCancellation>,
}

impl ScheduledSession {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.session_date.and_time(self.start_time)
    }

    /// Whether the session has not started by `now`.
    pub fn is_future(&self, now: NaiveDateTime) -> bool {
        self.starts_at() > now
    }
}

// =============================================================================
// Attendance
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Waiting,
    Completed,
    Cancelled,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Waiting => "WAITING",
            AttendanceStatus::Completed => "COMPLETED",
            AttendanceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(AttendanceStatus::Waiting),
            "COMPLETED" => Ok(AttendanceStatus::Completed),
            "CANCELLED" => Ok(AttendanceStatus::Cancelled),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceReason {
    Attended,
    Suspended,
    AutoSuspended,
    Cancelled,
    Sick,
    Refused,
    NotRequired,
    Rest,
    Clash,
    Other,
}

impl AttendanceReason {
    const ALL: [AttendanceReason; 10] = [
        AttendanceReason::Attended,
        AttendanceReason::Suspended,
        AttendanceReason::AutoSuspended,
        AttendanceReason::Cancelled,
        AttendanceReason::Sick,
        AttendanceReason::Refused,
        AttendanceReason::NotRequired,
        AttendanceReason::Rest,
        AttendanceReason::Clash,
        AttendanceReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceReason::Attended => "ATTENDED",
            AttendanceReason::Suspended => "SUSPENDED",
            AttendanceReason::AutoSuspended => "AUTO_SUSPENDED",
            AttendanceReason::Cancelled => "CANCELLED",
            AttendanceReason::Sick => "SICK",
            AttendanceReason::Refused => "REFUSED",
            AttendanceReason::NotRequired => "NOT_REQUIRED",
            AttendanceReason::Rest => "REST",
            AttendanceReason::Clash => "CLASH",
            AttendanceReason::Other => "OTHER",
        }
    }
}

impl std::str::FromStr for AttendanceReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttendanceReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("unknown attendance reason: {s}"))
    }
}

/// A person's outcome for one scheduled session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub attendance_id: AttendanceId,
    pub scheduled_instance_id: ScheduledInstanceId,
    pub prisoner_number: PrisonerNumber,
    pub status: AttendanceStatus,
    pub reason: Option<AttendanceReason>,
    pub issue_payment: Option<bool>,
    pub pay_amount: Option<i32>,
    pub recorded_by: Option<String>,
    pub recorded_at: Option<NaiveDateTime>,
    /// Set once downstream pay processing has taken the record.
    pub finalised: bool,
}

impl Attendance {
    pub fn waiting(scheduled_instance_id: ScheduledInstanceId, prisoner_number: PrisonerNumber) -> Self {
        Self {
            attendance_id: AttendanceId::new(),
            scheduled_instance_id,
            prisoner_number,
            status: AttendanceStatus::Waiting,
            reason: None,
            issue_payment: None,
            pay_amount: None,
            recorded_by: None,
            recorded_at: None,
            finalised: false,
        }
    }

    /// Whether this record may still be changed.
    pub fn editable(&self) -> bool {
        !self.finalised
    }

    pub fn is_waiting(&self) -> bool {
        self.status == AttendanceStatus::Waiting
    }

    /// Completed (or cancelled) with `reason`.
    pub fn has_reason(&self, reason: AttendanceReason) -> bool {
        self.status != AttendanceStatus::Waiting && self.reason == Some(reason)
    }

    pub fn complete(&mut self, reason: AttendanceReason, issue_payment: bool, by: &str, at: NaiveDateTime) {
        self.record(AttendanceStatus::Completed, reason, issue_payment, by, at);
    }

    pub fn cancel(&mut self, issue_payment: bool, by: &str, at: NaiveDateTime) {
        self.record(
            AttendanceStatus::Cancelled,
            AttendanceReason::Cancelled,
            issue_payment,
            by,
            at,
        );
    }

    pub fn reset_to_waiting(&mut self) {
        self.status = AttendanceStatus::Waiting;
        self.reason = None;
        self.issue_payment = None;
        self.pay_amount = None;
        self.recorded_by = None;
        self.recorded_at = None;
    }

    fn record(
        &mut self,
        status: AttendanceStatus,
        reason: AttendanceReason,
        issue_payment: bool,
        by: &str,
        at: NaiveDateTime,
    ) {
        self.status = status;
        self.reason = Some(reason);
        self.issue_payment = Some(issue_payment);
        self.recorded_by = Some(by.to_string());
        self.recorded_at = Some(at);
    }
}

/// An attendance together with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttendance {
    pub session: ScheduledSession,
    pub attendance: Attendance,
}
