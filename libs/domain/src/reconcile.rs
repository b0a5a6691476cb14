//! Attendance suspension reconciler.
//!
//! Keeps an allocation's future attendance records in line with its
//! suspension state. Only records that are still editable and whose session
//! has not started are ever touched.
//!
//! # Invariants
//!
//! - Both operations are idempotent
//! - Both return exactly the ids of the records they changed

use chrono::{NaiveDate, NaiveDateTime};
use regime_id::AttendanceId;

use crate::{Allocation, AllocationStatus, AttendanceReason, SessionAttendance, SYSTEM_ACTOR};

fn in_scope(
    record: &SessionAttendance,
    allocation: &Allocation,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> bool {
    record.attendance.prisoner_number == allocation.prisoner_number
        && record.session.activity_schedule_id == allocation.activity_schedule_id
        && record.session.session_date >= as_of
        && record.session.is_future(now)
        && record.attendance.editable()
}

/// Marks every future WAITING attendance on or after `as_of` as COMPLETED
/// with `reason` and the given payment flag.
pub fn suspend_future_attendances(
    as_of: NaiveDate,
    now: NaiveDateTime,
    allocation: &Allocation,
    records: &mut [SessionAttendance],
    reason: AttendanceReason,
    issue_payment: bool,
) -> Vec<AttendanceId> {
    records
        .iter_mut()
        .filter(|record| in_scope(record, allocation, as_of, now) && record.attendance.is_waiting())
        .map(|record| {
            record
                .attendance
                .complete(reason, issue_payment, SYSTEM_ACTOR, now);
            record.attendance.attendance_id
        })
        .collect()
}

/// Undoes `reason` on future attendances on or after `as_of`.
///
/// Each record carrying `reason` is, in order of precedence:
/// 1. cancelled, when its session has since been cancelled
/// 2. re-marked SUSPENDED (paid per the plan), when a planned suspension still covers it
/// 3. re-marked AUTO_SUSPENDED, when the allocation is still auto-suspended
/// 4. otherwise returned to WAITING
pub fn reset_suspended_future_attendances(
    as_of: NaiveDate,
    now: NaiveDateTime,
    allocation: &Allocation,
    records: &mut [SessionAttendance],
    reason: AttendanceReason,
) -> Vec<AttendanceId> {
    let mut changed = Vec::new();

    for record in records
        .iter_mut()
        .filter(|record| in_scope(record, allocation, as_of, now))
    {
        if !record.attendance.has_reason(reason) {
            continue;
        }

        let session_date = record.session.session_date;
        let attendance = &mut record.attendance;

        if let Some(cancellation) = &record.session.cancellation {
            attendance.cancel(cancellation.issue_payment, SYSTEM_ACTOR, now);
        } else if let Some(plan) = allocation.suspension_on(session_date) {
            if reason == AttendanceReason::Suspended && attendance.issue_payment == Some(plan.paid) {
                continue;
            }
            attendance.complete(AttendanceReason::Suspended, plan.paid, SYSTEM_ACTOR, now);
        } else if allocation.status == AllocationStatus::AutoSuspended {
            if reason == AttendanceReason::AutoSuspended {
                continue;
            }
            attendance.complete(AttendanceReason::AutoSuspended, false, SYSTEM_ACTOR, now);
        } else {
            attendance.reset_to_waiting();
        }

        changed.push(attendance.attendance_id);
    }

    changed
}
