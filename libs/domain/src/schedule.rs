//! Activity schedules and waiting-list applications.

use chrono::NaiveDate;
use regime_id::{ActivityScheduleId, PrisonCode, PrisonerNumber, WaitingListId};
use serde::{Deserialize, Serialize};

/// A recurring activity a site runs between two dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySchedule {
    pub activity_schedule_id: ActivityScheduleId,
    pub prison_code: PrisonCode,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl ActivitySchedule {
    /// Whether the schedule has run its course by `date`.
    pub fn ends_on_or_before(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end <= date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingListStatus {
    Pending,
    Approved,
    Declined,
    Removed,
    Allocated,
}

impl WaitingListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitingListStatus::Pending => "PENDING",
            WaitingListStatus::Approved => "APPROVED",
            WaitingListStatus::Declined => "DECLINED",
            WaitingListStatus::Removed => "REMOVED",
            WaitingListStatus::Allocated => "ALLOCATED",
        }
    }

    /// Still waiting for a place.
    pub fn is_open(&self) -> bool {
        matches!(self, WaitingListStatus::Pending | WaitingListStatus::Approved)
    }
}

impl std::str::FromStr for WaitingListStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WaitingListStatus::Pending),
            "APPROVED" => Ok(WaitingListStatus::Approved),
            "DECLINED" => Ok(WaitingListStatus::Declined),
            "REMOVED" => Ok(WaitingListStatus::Removed),
            "ALLOCATED" => Ok(WaitingListStatus::Allocated),
            other => Err(format!("unknown waiting list status: {other}")),
        }
    }
}

/// An application for a place on an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListApplication {
    pub waiting_list_id: WaitingListId,
    pub prison_code: PrisonCode,
    pub prisoner_number: PrisonerNumber,
    pub activity_schedule_id: ActivityScheduleId,
    pub status: WaitingListStatus,
}

impl WaitingListApplication {
    /// Removes an open application. Returns whether anything changed.
    pub fn remove(&mut self) -> bool {
        if !self.status.is_open() {
            return false;
        }
        self.status = WaitingListStatus::Removed;
        true
    }
}
