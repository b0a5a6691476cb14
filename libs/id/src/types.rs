//! Typed ID definitions for all regime records.
//!
//! Generated IDs are ULID-based; natural keys are validated codes.

use crate::{define_code, define_id};

// =============================================================================
// Allocations and Attendance
// =============================================================================

define_id!(AllocationId, "alc");
define_id!(AttendanceId, "att");
define_id!(WaitingListId, "wl");

// =============================================================================
// Activity Schedules
// =============================================================================

define_id!(ActivityScheduleId, "sch");
define_id!(ScheduledInstanceId, "sin");

// =============================================================================
// Jobs
// =============================================================================

define_id!(JobId, "job");

// =============================================================================
// Natural Keys
// =============================================================================

define_code!(PrisonCode, "prison code", validate_prison_code);
define_code!(PrisonerNumber, "prisoner number", validate_prisoner_number);

fn validate_prison_code(code: &str) -> Option<&'static str> {
    if !(2..=6).contains(&code.len()) {
        return Some("must be 2 to 6 characters");
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some("must be alphanumeric");
    }
    None
}

/// Prisoner numbers look like `A1234BC`.
fn validate_prisoner_number(number: &str) -> Option<&'static str> {
    let bytes = number.as_bytes();
    if bytes.len() != 7 {
        return Some("must be 7 characters");
    }
    let shape_ok = bytes[0].is_ascii_alphabetic()
        && bytes[1..5].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_alphabetic);
    if !shape_ok {
        return Some("must be a letter, four digits and two letters");
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
