//! Attendance creation for a single session and allocation.

use chrono::NaiveDateTime;

use crate::{Allocation, AllocationStatus, Attendance, AttendanceReason, ScheduledSession, SYSTEM_ACTOR};

/// Decides the attendance record `session` produces for `allocation`.
///
/// Returns `None` when no record should exist: the allocation belongs to a
/// different schedule, is not current on the session date, is excluded from
/// the session's weekday slot, or a record already exists.
///
/// The record's initial state, in order of precedence:
/// 1. CANCELLED when the session is cancelled
/// 2. COMPLETED / SUSPENDED when a planned or manual suspension applies
/// 3. COMPLETED / AUTO_SUSPENDED when the person is away
/// 4. WAITING otherwise
pub fn plan_attendance(
    session: &ScheduledSession,
    allocation: &Allocation,
    already_exists: bool,
    now: NaiveDateTime,
) -> Option<Attendance> {
    if already_exists
        || allocation.activity_schedule_id != session.activity_schedule_id
        || !allocation.is_current_on(session.session_date)
        || allocation.is_excluded_on(session.session_date, session.time_slot)
    {
        return None;
    }

    let mut attendance = Attendance::waiting(
        session.scheduled_instance_id,
        allocation.prisoner_number.clone(),
    );

    if let Some(cancellation) = &session.cancellation {
        attendance.cancel(cancellation.issue_payment, SYSTEM_ACTOR, now);
        return Some(attendance);
    }

    let planned = allocation.suspension_on(session.session_date).map(|plan| plan.paid);
    match (allocation.status, planned) {
        (_, Some(paid)) => {
            attendance.complete(AttendanceReason::Suspended, paid, SYSTEM_ACTOR, now);
        }
        (AllocationStatus::Suspended, None) => {
            attendance.complete(AttendanceReason::Suspended, false, SYSTEM_ACTOR, now);
        }
        (AllocationStatus::SuspendedWithPay, None) => {
            attendance.complete(AttendanceReason::Suspended, true, SYSTEM_ACTOR, now);
        }
        (AllocationStatus::AutoSuspended, None) => {
            attendance.complete(AttendanceReason::AutoSuspended, false, SYSTEM_ACTOR, now);
        }
        (AllocationStatus::Active | AllocationStatus::Pending | AllocationStatus::Ended, None) => {}
    }

    Some(attendance)
}
