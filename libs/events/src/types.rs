//! Outbound domain event definitions.
//!
//! Payloads are deliberately id-only: the event announces that a record
//! changed, never what it changed to.

use regime_id::{AllocationId, AttendanceId};
use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Event Type Constants
// =============================================================================

/// All outbound event type names as constants.
pub mod event_types {
    pub const ALLOCATION_AMENDED: &str = "activities.prisoner.allocation-amended";
    pub const ATTENDANCE_AMENDED: &str = "activities.prisoner.attendance-amended";
    pub const ATTENDANCE_CREATED: &str = "activities.prisoner.attendance-created";
    pub const ATTENDANCE_EXPIRED: &str = "activities.prisoner.attendance-expired";
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationInformation {
    pub allocation_id: AllocationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceInformation {
    pub attendance_id: AttendanceId,
}

// =============================================================================
// Domain Events
// =============================================================================

/// An outbound event, keyed by the record it announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainEvent {
    AllocationAmended(AllocationId),
    AttendanceAmended(AttendanceId),
    AttendanceCreated(AttendanceId),
    AttendanceExpired(AttendanceId),
}

impl DomainEvent {
    /// The wire event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AllocationAmended(_) => event_types::ALLOCATION_AMENDED,
            DomainEvent::AttendanceAmended(_) => event_types::ATTENDANCE_AMENDED,
            DomainEvent::AttendanceCreated(_) => event_types::ATTENDANCE_CREATED,
            DomainEvent::AttendanceExpired(_) => event_types::ATTENDANCE_EXPIRED,
        }
    }

    /// Human readable description carried in the envelope.
    pub fn description(&self) -> &'static str {
        match self {
            DomainEvent::AllocationAmended(_) => "A prisoner allocation has been amended",
            DomainEvent::AttendanceAmended(_) => "A prisoner attendance has been amended",
            DomainEvent::AttendanceCreated(_) => "A prisoner attendance has been created",
            DomainEvent::AttendanceExpired(_) => {
                "An unmarked prisoner attendance has expired"
            }
        }
    }

    /// The id of the record this event announces, in canonical string form.
    pub fn record_id(&self) -> String {
        match self {
            DomainEvent::AllocationAmended(id) => id.to_string(),
            DomainEvent::AttendanceAmended(id)
            | DomainEvent::AttendanceCreated(id)
            | DomainEvent::AttendanceExpired(id) => id.to_string(),
        }
    }

    /// The `additionalInformation` block for the envelope.
    pub fn additional_information(&self) -> Result<serde_json::Value, EventError> {
        let value = match self {
            DomainEvent::AllocationAmended(id) => serde_json::to_value(AllocationInformation {
                allocation_id: *id,
            })?,
            DomainEvent::AttendanceAmended(id)
            | DomainEvent::AttendanceCreated(id)
            | DomainEvent::AttendanceExpired(id) => {
                serde_json::to_value(AttendanceInformation { attendance_id: *id })?
            }
        };
        Ok(value)
    }

    /// Rebuilds a domain event from its wire type and information block.
    pub fn from_parts(
        event_type: &str,
        additional_information: &serde_json::Value,
    ) -> Result<Self, EventError> {
        let attendance = || -> Result<AttendanceId, EventError> {
            let info: AttendanceInformation =
                serde_json::from_value(additional_information.clone())
                    .map_err(|e| EventError::InvalidPayload(e.to_string()))?;
            Ok(info.attendance_id)
        };

        match event_type {
            event_types::ALLOCATION_AMENDED => {
                let info: AllocationInformation =
                    serde_json::from_value(additional_information.clone())
                        .map_err(|e| EventError::InvalidPayload(e.to_string()))?;
                Ok(DomainEvent::AllocationAmended(info.allocation_id))
            }
            event_types::ATTENDANCE_AMENDED => Ok(DomainEvent::AttendanceAmended(attendance()?)),
            event_types::ATTENDANCE_CREATED => Ok(DomainEvent::AttendanceCreated(attendance()?)),
            event_types::ATTENDANCE_EXPIRED => Ok(DomainEvent::AttendanceExpired(attendance()?)),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

impl std::fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.event_type(), self.record_id())
    }
}

// =============================================================================
// Tests
// =============================================================================
