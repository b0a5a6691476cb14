//! Allocation state machine.
//!
//! ```text
//!            ┌──────────── received (planned suspension applies) ─────┐
//!            │                                                        ▼
//! PENDING ─► ACTIVE ◄──► SUSPENDED / SUSPENDED_WITH_PAY        AUTO_SUSPENDED
//!    │         │  ▲                    │                           │   ▲
//!    │         │  └──── received ──────┼───────────────────────────┘   │
//!    │         └────── temporarily away┴──────────────────────────────►┘
//!    └────────────────────────── any ───────────────────────────► ENDED
//! ```
//!
//! ENDED is terminal. A pending allocation whose person is not present when it
//! should start goes straight to AUTO_SUSPENDED.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use regime_id::{ActivityScheduleId, AllocationId, PrisonCode, PrisonerNumber};
use serde::{Deserialize, Serialize};

use crate::{AllocationError, TimeSlot};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Pending,
    Active,
    Suspended,
    SuspendedWithPay,
    AutoSuspended,
    Ended,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Pending => "PENDING",
            AllocationStatus::Active => "ACTIVE",
            AllocationStatus::Suspended => "SUSPENDED",
            AllocationStatus::SuspendedWithPay => "SUSPENDED_WITH_PAY",
            AllocationStatus::AutoSuspended => "AUTO_SUSPENDED",
            AllocationStatus::Ended => "ENDED",
        }
    }

    /// Any of the three suspended states.
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            AllocationStatus::Suspended
                | AllocationStatus::SuspendedWithPay
                | AllocationStatus::AutoSuspended
        )
    }

    /// Suspended by a person rather than by a detected absence.
    pub fn is_manually_suspended(&self) -> bool {
        matches!(
            self,
            AllocationStatus::Suspended | AllocationStatus::SuspendedWithPay
        )
    }

    fn suspended(paid: bool) -> Self {
        if paid {
            AllocationStatus::SuspendedWithPay
        } else {
            AllocationStatus::Suspended
        }
    }
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AllocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AllocationStatus::Pending),
            "ACTIVE" => Ok(AllocationStatus::Active),
            "SUSPENDED" => Ok(AllocationStatus::Suspended),
            "SUSPENDED_WITH_PAY" => Ok(AllocationStatus::SuspendedWithPay),
            "AUTO_SUSPENDED" => Ok(AllocationStatus::AutoSuspended),
            "ENDED" => Ok(AllocationStatus::Ended),
            other => Err(format!("unknown allocation status: {other}")),
        }
    }
}

// =============================================================================
// Deallocation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeallocationReason {
    /// The activity or the allocation reached its end date.
    Ended,
    /// Absent for longer than the site allows.
    Expired,
    /// Away from the site beyond its expiry threshold.
    TemporarilyReleased,
    /// Released from custody.
    Released,
    Transferred,
    Healthcare,
    Security,
    WithdrawnOwn,
    WithdrawnStaff,
    Other,
}

impl DeallocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeallocationReason::Ended => "ENDED",
            DeallocationReason::Expired => "EXPIRED",
            DeallocationReason::TemporarilyReleased => "TEMPORARILY_RELEASED",
            DeallocationReason::Released => "RELEASED",
            DeallocationReason::Transferred => "TRANSFERRED",
            DeallocationReason::Healthcare => "HEALTHCARE",
            DeallocationReason::Security => "SECURITY",
            DeallocationReason::WithdrawnOwn => "WITHDRAWN_OWN",
            DeallocationReason::WithdrawnStaff => "WITHDRAWN_STAFF",
            DeallocationReason::Other => "OTHER",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeallocationReason::Ended => "Allocation end date reached",
            DeallocationReason::Expired => "Expired",
            DeallocationReason::TemporarilyReleased => "Temporarily released or transferred",
            DeallocationReason::Released => "Released from prison",
            DeallocationReason::Transferred => "Transferred",
            DeallocationReason::Healthcare => "Health",
            DeallocationReason::Security => "Security",
            DeallocationReason::WithdrawnOwn => "Withdrawn by prisoner",
            DeallocationReason::WithdrawnStaff => "Withdrawn by staff",
            DeallocationReason::Other => "Other",
        }
    }
}

impl std::fmt::Display for DeallocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeallocationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            DeallocationReason::Ended,
            DeallocationReason::Expired,
            DeallocationReason::TemporarilyReleased,
            DeallocationReason::Released,
            DeallocationReason::Transferred,
            DeallocationReason::Healthcare,
            DeallocationReason::Security,
            DeallocationReason::WithdrawnOwn,
            DeallocationReason::WithdrawnStaff,
            DeallocationReason::Other,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == s)
        .ok_or_else(|| format!("unknown deallocation reason: {s}"))
    }
}

/// A deallocation booked for a future date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDeallocation {
    pub planned_date: NaiveDate,
    pub reason: DeallocationReason,
    pub planned_by: String,
    pub planned_at: NaiveDateTime,
}

// =============================================================================
// Planned Suspension
// =============================================================================

/// A user-declared window during which the allocation is paused.
///
/// `end_date` is exclusive: it is the first day the allocation runs again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSuspension {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub paid: bool,
    pub planned_by: String,
    pub planned_at: NaiveDateTime,
    pub ended_by: Option<String>,
    pub ended_at: Option<NaiveDateTime>,
}

impl PlannedSuspension {
    pub fn new(start_date: NaiveDate, paid: bool, planned_by: &str, planned_at: NaiveDateTime) -> Self {
        Self {
            start_date,
            end_date: None,
            paid,
            planned_by: planned_by.to_string(),
            planned_at,
            ended_by: None,
            ended_at: None,
        }
    }

    /// Whether the window has been closed off.
    pub fn has_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Whether the window covers `date` and has not been closed off.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        !self.has_ended()
            && self.start_date <= date
            && self.end_date.map_or(true, |end| date < end)
    }

    fn end(&mut self, by: &str, at: NaiveDateTime) {
        if self.ended_at.is_none() {
            self.ended_by = Some(by.to_string());
            self.ended_at = Some(at);
        }
    }
}

// =============================================================================
// Exclusions
// =============================================================================

/// A weekday slot the person does not attend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotExclusion {
    pub weekday: Weekday,
    pub time_slot: TimeSlot,
}

// =============================================================================
// Allocation
// =============================================================================

/// Assignment of a person to a recurring activity schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: AllocationId,
    pub prison_code: PrisonCode,
    pub activity_schedule_id: ActivityScheduleId,
    pub prisoner_number: PrisonerNumber,
    pub status: AllocationStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub pay_band: Option<String>,
    pub exclusions: Vec<SlotExclusion>,
    pub planned_suspension: Option<PlannedSuspension>,
    pub planned_deallocation: Option<PlannedDeallocation>,
    pub allocated_by: String,
    pub allocated_at: NaiveDateTime,
    pub suspended_by: Option<String>,
    pub suspended_at: Option<NaiveDateTime>,
    pub suspended_reason: Option<String>,
    pub deallocated_by: Option<String>,
    pub deallocated_at: Option<NaiveDateTime>,
    pub deallocated_reason: Option<DeallocationReason>,
}

/// The system actor recorded against automatic transitions.
pub const SYSTEM_ACTOR: &str = "Activities Management Service";

impl Allocation {
    /// Creates a PENDING allocation, as on approval of a waiting-list application.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        prison_code: PrisonCode,
        activity_schedule_id: ActivityScheduleId,
        prisoner_number: PrisonerNumber,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        pay_band: Option<String>,
        allocated_by: &str,
        allocated_at: NaiveDateTime,
    ) -> Result<Self, AllocationError> {
        let allocation_id = AllocationId::new();
        if let Some(end_date) = end_date {
            if end_date < start_date {
                return Err(AllocationError::EndBeforeStart {
                    allocation_id,
                    start_date,
                    end_date,
                });
            }
        }

        Ok(Self {
            allocation_id,
            prison_code,
            activity_schedule_id,
            prisoner_number,
            status: AllocationStatus::Pending,
            start_date,
            end_date,
            pay_band,
            exclusions: Vec::new(),
            planned_suspension: None,
            planned_deallocation: None,
            allocated_by: allocated_by.to_string(),
            allocated_at,
            suspended_by: None,
            suspended_at: None,
            suspended_reason: None,
            deallocated_by: None,
            deallocated_at: None,
            deallocated_reason: None,
        })
    }

    pub fn is_ended(&self) -> bool {
        self.status == AllocationStatus::Ended
    }

    /// Whether the allocation should produce attendance on `date`.
    pub fn is_current_on(&self, date: NaiveDate) -> bool {
        !matches!(
            self.status,
            AllocationStatus::Ended | AllocationStatus::Pending
        ) && self.start_date <= date
            && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn is_excluded(&self, weekday: Weekday, time_slot: TimeSlot) -> bool {
        self.exclusions
            .iter()
            .any(|e| e.weekday == weekday && e.time_slot == time_slot)
    }

    pub fn is_excluded_on(&self, date: NaiveDate, time_slot: TimeSlot) -> bool {
        self.is_excluded(date.weekday(), time_slot)
    }

    /// The planned suspension covering `date`, if any.
    pub fn suspension_on(&self, date: NaiveDate) -> Option<&PlannedSuspension> {
        self.planned_suspension
            .as_ref()
            .filter(|plan| plan.applies_on(date))
    }

    /// The reason this allocation should end on `date`, if it is due.
    ///
    /// A planned deallocation wins over the allocation's own end date.
    pub fn deallocation_due(&self, date: NaiveDate) -> Option<DeallocationReason> {
        if self.is_ended() {
            return None;
        }
        if let Some(plan) = &self.planned_deallocation {
            if plan.planned_date <= date {
                return Some(plan.reason);
            }
        }
        match self.end_date {
            Some(end) if end <= date => Some(DeallocationReason::Ended),
            _ => None,
        }
    }

    fn ensure_not_ended(&self) -> Result<(), AllocationError> {
        if self.is_ended() {
            return Err(AllocationError::Ended {
                allocation_id: self.allocation_id,
            });
        }
        Ok(())
    }

    fn invalid(&self, to: AllocationStatus) -> AllocationError {
        AllocationError::InvalidTransition {
            allocation_id: self.allocation_id,
            from: self.status,
            to,
        }
    }

    fn record_suspension(&mut self, status: AllocationStatus, reason: &str, by: &str, at: NaiveDateTime) {
        self.status = status;
        self.suspended_by = Some(by.to_string());
        self.suspended_at = Some(at);
        self.suspended_reason = Some(reason.to_string());
    }

    fn clear_suspension(&mut self) {
        self.suspended_by = None;
        self.suspended_at = None;
        self.suspended_reason = None;
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// PENDING → ACTIVE.
    pub fn activate(&mut self) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        if self.status != AllocationStatus::Pending {
            return Err(self.invalid(AllocationStatus::Active));
        }
        self.status = AllocationStatus::Active;
        Ok(())
    }

    /// PENDING / ACTIVE / SUSPENDED* → AUTO_SUSPENDED.
    pub fn auto_suspend(&mut self, at: NaiveDateTime, reason: &str) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        if self.status == AllocationStatus::AutoSuspended {
            return Err(AllocationError::AlreadySuspended {
                allocation_id: self.allocation_id,
            });
        }
        self.record_suspension(AllocationStatus::AutoSuspended, reason, SYSTEM_ACTOR, at);
        Ok(())
    }

    /// PENDING / ACTIVE → SUSPENDED or SUSPENDED_WITH_PAY.
    pub fn suspend(
        &mut self,
        at: NaiveDateTime,
        reason: &str,
        by: &str,
        paid: bool,
    ) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        if self.status.is_suspended() {
            return Err(AllocationError::AlreadySuspended {
                allocation_id: self.allocation_id,
            });
        }
        self.record_suspension(AllocationStatus::suspended(paid), reason, by, at);
        Ok(())
    }

    /// SUSPENDED* → ACTIVE.
    pub fn unsuspend(&mut self) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        if !self.status.is_manually_suspended() {
            return Err(AllocationError::NotSuspended {
                allocation_id: self.allocation_id,
            });
        }
        self.status = AllocationStatus::Active;
        self.clear_suspension();
        Ok(())
    }

    /// AUTO_SUSPENDED → ACTIVE, or SUSPENDED* when a planned suspension covers
    /// `at`. Returns the new status.
    pub fn reactivate(&mut self, at: NaiveDateTime) -> Result<AllocationStatus, AllocationError> {
        self.ensure_not_ended()?;
        if self.status != AllocationStatus::AutoSuspended {
            return Err(AllocationError::NotSuspended {
                allocation_id: self.allocation_id,
            });
        }

        match self.suspension_on(at.date()).map(|plan| (plan.paid, plan.planned_by.clone())) {
            Some((paid, planned_by)) => {
                self.record_suspension(
                    AllocationStatus::suspended(paid),
                    "Planned suspension",
                    &planned_by,
                    at,
                );
            }
            None => {
                self.status = AllocationStatus::Active;
                self.clear_suspension();
            }
        }
        Ok(self.status)
    }

    /// Any non-ended status → ENDED.
    pub fn deallocate_now(
        &mut self,
        at: NaiveDateTime,
        reason: DeallocationReason,
        by: &str,
    ) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        let today = at.date();

        self.status = AllocationStatus::Ended;
        self.deallocated_by = Some(by.to_string());
        self.deallocated_at = Some(at);
        self.deallocated_reason = Some(reason);
        self.planned_deallocation = None;
        self.clear_suspension();

        if today >= self.start_date && self.end_date.map_or(true, |end| end > today) {
            self.end_date = Some(today);
        }
        if let Some(plan) = self.planned_suspension.as_mut() {
            plan.end(by, at);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    /// Records a planned suspension starting on `start_date`.
    ///
    /// Rejects the plan if the allocation has ended, is already suspended or
    /// has an open plan, or if the start falls after the allocation's end.
    pub fn plan_suspension(
        &mut self,
        start_date: NaiveDate,
        paid: bool,
        by: &str,
        at: NaiveDateTime,
    ) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;

        if self.status.is_manually_suspended()
            || self.planned_suspension.as_ref().is_some_and(|p| !p.has_ended())
        {
            return Err(AllocationError::AlreadySuspended {
                allocation_id: self.allocation_id,
            });
        }

        if let Some(end_date) = self.end_date {
            if start_date > end_date {
                return Err(AllocationError::SuspendAfterEnd {
                    allocation_id: self.allocation_id,
                    suspend_from: start_date,
                    end_date,
                });
            }
        }

        if start_date < at.date() {
            return Err(AllocationError::DateInPast {
                allocation_id: self.allocation_id,
                date: start_date,
            });
        }

        self.planned_suspension = Some(PlannedSuspension::new(start_date, paid, by, at));
        Ok(())
    }

    /// Sets the date the open planned suspension stops applying.
    pub fn plan_unsuspension(
        &mut self,
        suspend_until: NaiveDate,
        at: NaiveDateTime,
    ) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;

        let allocation_id = self.allocation_id;
        let Some(plan) = self
            .planned_suspension
            .as_mut()
            .filter(|plan| !plan.has_ended())
        else {
            return Err(AllocationError::NotSuspended { allocation_id });
        };

        if suspend_until < at.date() {
            return Err(AllocationError::DateInPast {
                allocation_id,
                date: suspend_until,
            });
        }

        plan.end_date = Some(suspend_until.max(plan.start_date));
        Ok(())
    }

    /// Closes the open planned suspension, if any.
    pub fn end_planned_suspension(&mut self, by: &str, at: NaiveDateTime) {
        if let Some(plan) = self.planned_suspension.as_mut() {
            plan.end(by, at);
        }
    }

    /// Books a deallocation for `date`.
    pub fn plan_deallocation(
        &mut self,
        date: NaiveDate,
        reason: DeallocationReason,
        by: &str,
        at: NaiveDateTime,
    ) -> Result<(), AllocationError> {
        self.ensure_not_ended()?;
        if date < self.start_date {
            return Err(AllocationError::EndBeforeStart {
                allocation_id: self.allocation_id,
                start_date: self.start_date,
                end_date: date,
            });
        }
        if date < at.date() {
            return Err(AllocationError::DateInPast {
                allocation_id: self.allocation_id,
                date,
            });
        }

        self.end_date = Some(date);
        self.planned_deallocation = Some(PlannedDeallocation {
            planned_date: date,
            reason,
            planned_by: by.to_string(),
            planned_at: at,
        });
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    pub(crate) fn allocation(status: AllocationStatus) -> Allocation {
        let mut allocation = Allocation::pending(
            PrisonCode::parse("MDI").unwrap(),
            ActivityScheduleId::new(),
            PrisonerNumber::parse("A1234BC").unwrap(),
            date(2024, 1, 1),
            None,
            Some("LOW".to_string()),
            "staff",
            at(2023, 12, 20, 9),
        )
        .unwrap();
        allocation.status = status;
        allocation
    }

    #[test]
    fn test_end_before_start_rejected() {
        let result = Allocation::pending(
            PrisonCode::parse("MDI").unwrap(),
            ActivityScheduleId::new(),
            PrisonerNumber::parse("A1234BC").unwrap(),
            date(2024, 1, 10),
            Some(date(2024, 1, 9)),
            None,
            "staff",
            at(2024, 1, 1, 9),
        );
        assert!(matches!(result, Err(AllocationError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_activate_pending() {
        let mut allocation = allocation(AllocationStatus::Pending);
        allocation.activate().unwrap();
        assert_eq!(allocation.status, AllocationStatus::Active);

        let err = allocation.activate().unwrap_err();
        assert!(matches!(err, AllocationError::InvalidTransition { .. }));
    }

    #[rstest]
    #[case(AllocationStatus::Pending, true)]
    #[case(AllocationStatus::Active, true)]
    #[case(AllocationStatus::Suspended, true)]
    #[case(AllocationStatus::SuspendedWithPay, true)]
    #[case(AllocationStatus::AutoSuspended, false)]
    #[case(AllocationStatus::Ended, false)]
    fn test_auto_suspend_from(#[case] from: AllocationStatus, #[case] allowed: bool) {
        let mut allocation = allocation(from);
        let result = allocation.auto_suspend(at(2024, 2, 1, 9), "Temporarily released");
        assert_eq!(result.is_ok(), allowed);
        if allowed {
            assert_eq!(allocation.status, AllocationStatus::AutoSuspended);
            assert_eq!(allocation.suspended_by.as_deref(), Some(SYSTEM_ACTOR));
        } else {
            assert_eq!(allocation.status, from);
        }
    }

    #[rstest]
    #[case(false, AllocationStatus::Suspended)]
    #[case(true, AllocationStatus::SuspendedWithPay)]
    fn test_suspend_active(#[case] paid: bool, #[case] expected: AllocationStatus) {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .suspend(at(2024, 2, 1, 9), "Planned suspension", "staff", paid)
            .unwrap();
        assert_eq!(allocation.status, expected);
        assert_eq!(allocation.suspended_reason.as_deref(), Some("Planned suspension"));
    }

    #[rstest]
    #[case(AllocationStatus::Suspended)]
    #[case(AllocationStatus::SuspendedWithPay)]
    #[case(AllocationStatus::AutoSuspended)]
    fn test_suspend_already_suspended(#[case] from: AllocationStatus) {
        let mut allocation = allocation(from);
        let err = allocation
            .suspend(at(2024, 2, 1, 9), "again", "staff", false)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::AlreadySuspended {
                allocation_id: allocation.allocation_id
            }
        );
    }

    #[test]
    fn test_unsuspend_requires_manual_suspension() {
        let mut allocation = allocation(AllocationStatus::AutoSuspended);
        assert!(matches!(
            allocation.unsuspend(),
            Err(AllocationError::NotSuspended { .. })
        ));

        allocation.status = AllocationStatus::SuspendedWithPay;
        allocation.suspended_reason = Some("x".into());
        allocation.unsuspend().unwrap();
        assert_eq!(allocation.status, AllocationStatus::Active);
        assert!(allocation.suspended_reason.is_none());
    }

    #[test]
    fn test_reactivate_without_plan_goes_active() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation.auto_suspend(at(2024, 2, 1, 9), "away").unwrap();
        let status = allocation.reactivate(at(2024, 2, 3, 9)).unwrap();
        assert_eq!(status, AllocationStatus::Active);
    }

    #[test]
    fn test_reactivate_prefers_planned_suspension() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .plan_suspension(date(2024, 2, 2), true, "staff", at(2024, 2, 1, 8))
            .unwrap();
        allocation.auto_suspend(at(2024, 2, 1, 9), "away").unwrap();

        let status = allocation.reactivate(at(2024, 2, 3, 9)).unwrap();
        assert_eq!(status, AllocationStatus::SuspendedWithPay);
    }

    #[test]
    fn test_ended_is_terminal() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .deallocate_now(at(2024, 2, 1, 22), DeallocationReason::Ended, SYSTEM_ACTOR)
            .unwrap();
        assert_eq!(allocation.status, AllocationStatus::Ended);
        assert_eq!(allocation.end_date, Some(date(2024, 2, 1)));

        assert!(matches!(allocation.activate(), Err(AllocationError::Ended { .. })));
        assert!(matches!(
            allocation.auto_suspend(at(2024, 2, 2, 9), "away"),
            Err(AllocationError::Ended { .. })
        ));
        assert!(matches!(
            allocation.suspend(at(2024, 2, 2, 9), "x", "staff", false),
            Err(AllocationError::Ended { .. })
        ));
        assert!(matches!(
            allocation.deallocate_now(at(2024, 2, 2, 9), DeallocationReason::Other, "staff"),
            Err(AllocationError::Ended { .. })
        ));
    }

    #[test]
    fn test_deallocating_future_pending_keeps_end_after_start() {
        let mut allocation = allocation(AllocationStatus::Pending);
        allocation.start_date = date(2024, 3, 1);
        allocation
            .deallocate_now(at(2024, 2, 1, 9), DeallocationReason::Released, SYSTEM_ACTOR)
            .unwrap();
        assert_eq!(allocation.end_date, None);
    }

    #[test]
    fn test_plan_suspension_after_end_rejected() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation.end_date = Some(date(2024, 3, 1));
        let err = allocation
            .plan_suspension(date(2024, 3, 2), false, "staff", at(2024, 2, 1, 9))
            .unwrap_err();
        assert!(matches!(err, AllocationError::SuspendAfterEnd { .. }));
    }

    #[test]
    fn test_plan_suspension_rejects_second_open_plan() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .plan_suspension(date(2024, 3, 2), false, "staff", at(2024, 2, 1, 9))
            .unwrap();
        let err = allocation
            .plan_suspension(date(2024, 3, 5), false, "staff", at(2024, 2, 1, 9))
            .unwrap_err();
        assert!(matches!(err, AllocationError::AlreadySuspended { .. }));
    }

    #[test]
    fn test_planned_suspension_window_is_end_exclusive() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .plan_suspension(date(2024, 3, 2), false, "staff", at(2024, 2, 1, 9))
            .unwrap();
        allocation
            .plan_unsuspension(date(2024, 3, 5), at(2024, 2, 1, 9))
            .unwrap();

        assert!(allocation.suspension_on(date(2024, 3, 1)).is_none());
        assert!(allocation.suspension_on(date(2024, 3, 2)).is_some());
        assert!(allocation.suspension_on(date(2024, 3, 4)).is_some());
        assert!(allocation.suspension_on(date(2024, 3, 5)).is_none());

        allocation.end_planned_suspension("staff", at(2024, 3, 3, 9));
        assert!(allocation.suspension_on(date(2024, 3, 4)).is_none());
    }

    #[test]
    fn test_plan_unsuspension_without_plan() {
        let mut allocation = allocation(AllocationStatus::Active);
        assert!(matches!(
            allocation.plan_unsuspension(date(2024, 3, 5), at(2024, 2, 1, 9)),
            Err(AllocationError::NotSuspended { .. })
        ));
    }

    #[test]
    fn test_deallocation_due_prefers_plan() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation
            .plan_deallocation(date(2024, 3, 1), DeallocationReason::Security, "staff", at(2024, 2, 1, 9))
            .unwrap();

        assert_eq!(allocation.deallocation_due(date(2024, 2, 29)), None);
        assert_eq!(
            allocation.deallocation_due(date(2024, 3, 1)),
            Some(DeallocationReason::Security)
        );

        allocation.planned_deallocation = None;
        assert_eq!(
            allocation.deallocation_due(date(2024, 3, 1)),
            Some(DeallocationReason::Ended)
        );
    }

    #[test]
    fn test_is_current_on() {
        let mut allocation = allocation(AllocationStatus::Active);
        allocation.end_date = Some(date(2024, 1, 31));
        assert!(!allocation.is_current_on(date(2023, 12, 31)));
        assert!(allocation.is_current_on(date(2024, 1, 1)));
        assert!(allocation.is_current_on(date(2024, 1, 31)));
        assert!(!allocation.is_current_on(date(2024, 2, 1)));

        allocation.status = AllocationStatus::Pending;
        assert!(!allocation.is_current_on(date(2024, 1, 15)));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            AllocationStatus::Pending,
            AllocationStatus::Active,
            AllocationStatus::Suspended,
            AllocationStatus::SuspendedWithPay,
            AllocationStatus::AutoSuspended,
            AllocationStatus::Ended,
        ] {
            assert_eq!(status.as_str().parse::<AllocationStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
