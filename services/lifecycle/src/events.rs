//! Outbound event publication.
//!
//! Events are handed over only after the change they describe has committed.
//! A failure here is logged and dropped: the committed data stays as it is and
//! consumers catch up on the next change to the same record.

use std::sync::Arc;

use chrono::Utc;
use regime_events::{DomainEvent, EventEnvelope};
use tracing::{debug, error, warn};

use crate::ports::OutboundEvents;

#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn OutboundEvents>,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn OutboundEvents>) -> Self {
        Self { sink }
    }

    /// Publishes events for an already-committed change. Never fails.
    pub async fn publish_after_commit(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }

        let occurred_at = Utc::now();
        let envelopes: Vec<EventEnvelope> = events
            .iter()
            .filter_map(|event| match EventEnvelope::for_event(event, occurred_at) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(error = %e, event = %event, "Failed to build event envelope");
                    None
                }
            })
            .collect();

        match self.sink.append(&envelopes).await {
            Ok(()) => debug!(count = envelopes.len(), "Published events"),
            Err(e) => {
                let ids: Vec<String> = events.iter().map(DomainEvent::record_id).collect();
                error!(error = %e, record_ids = ?ids, "Failed to publish events after commit");
            }
        }
    }
}
