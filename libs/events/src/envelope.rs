//! Event envelope - the common wrapper for all outbound events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainEvent, EventError};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: &str = "1";

/// The outbound event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// The event type (e.g., "activities.prisoner.allocation-amended").
    pub event_type: String,

    /// Schema version for the envelope.
    pub version: String,

    /// Human readable description.
    pub description: String,

    /// When the owning change was committed.
    pub occurred_at: DateTime<Utc>,

    /// Id-only payload.
    pub additional_information: serde_json::Value,
}

impl EventEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::new()
    }

    /// Wraps a domain event.
    pub fn for_event(event: &DomainEvent, occurred_at: DateTime<Utc>) -> Result<Self, EventError> {
        Self::builder()
            .event_type(event.event_type())
            .description(event.description())
            .occurred_at(occurred_at)
            .additional_information(event.additional_information()?)
            .build()
    }

    /// Decodes the domain event carried by this envelope.
    pub fn domain_event(&self) -> Result<DomainEvent, EventError> {
        DomainEvent::from_parts(&self.event_type, &self.additional_information)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_type: Option<String>,
    version: Option<String>,
    description: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
    additional_information: Option<serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn additional_information(mut self, info: serde_json::Value) -> Self {
        self.additional_information = Some(info);
        self
    }

    /// Builds the envelope.
    ///
    /// `occurred_at` defaults to now and `version` to [`ENVELOPE_VERSION`].
    pub fn build(self) -> Result<EventEnvelope, EventError> {
        Ok(EventEnvelope {
            event_type: self.event_type.ok_or(EventError::MissingField("event_type"))?,
            version: self
                .version
                .unwrap_or_else(|| ENVELOPE_VERSION.to_string()),
            description: self.description.unwrap_or_default(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            additional_information: self
                .additional_information
                .ok_or(EventError::MissingField("additional_information"))?,
        })
    }
}
