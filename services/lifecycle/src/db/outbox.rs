//! Event outbox.

use async_trait::async_trait;
use regime_events::EventEnvelope;
use sqlx::postgres::PgPool;

use super::DbError;
use crate::ports::OutboundEvents;

/// Appends envelopes to `outbound_events` for relay to the broker.
#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboundEvents for PgOutbox {
    async fn append(&self, envelopes: &[EventEnvelope]) -> Result<(), DbError> {
        if envelopes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        for envelope in envelopes {
            sqlx::query(
                r#"
                INSERT INTO outbound_events (event_type, payload, occurred_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&envelope.event_type)
            .bind(serde_json::to_value(envelope)?)
            .bind(envelope.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }
        tx.commit().await.map_err(DbError::Query)?;
        Ok(())
    }
}
