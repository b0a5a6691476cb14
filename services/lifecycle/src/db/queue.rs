//! Postgres-backed work queue.
//!
//! Receiving claims rows with `FOR UPDATE SKIP LOCKED` and pushes their
//! visibility past the lease. A message that is not acked before the lease
//! runs out becomes visible again, so delivery is at-least-once.

use std::time::Duration;

use async_trait::async_trait;
use regime_events::QueueMessage;
use sqlx::{postgres::PgPool, Row};
use tracing::{debug, warn};

use super::DbError;
use crate::ports::{Delivery, JobQueue};

/// Postgres-backed [`JobQueue`].
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    lease: Duration,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    /// Number of messages waiting, claimed or not.
    pub async fn depth(&self) -> Result<i64, DbError> {
        sqlx::query_scalar("SELECT count(*) FROM job_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn publish(&self, messages: &[QueueMessage]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        for message in messages {
            sqlx::query("INSERT INTO job_messages (payload) VALUES ($1)")
                .bind(serde_json::to_value(message)?)
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
        }

        tx.commit().await.map_err(DbError::Query)?;
        debug!(count = messages.len(), "Published queue messages");
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, DbError> {
        let rows = sqlx::query(
            r#"
            UPDATE job_messages
            SET visible_at = now() + make_interval(secs => $2),
                attempts = attempts + 1
            WHERE message_id IN (
                SELECT message_id
                FROM job_messages
                WHERE visible_at <= now()
                ORDER BY message_id
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING message_id, attempts, payload
            "#,
        )
        .bind(i64::try_from(max).unwrap_or(i64::MAX))
        .bind(self.lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let delivery_id: i64 = row.try_get("message_id").map_err(DbError::Query)?;
            let attempts: i32 = row.try_get("attempts").map_err(DbError::Query)?;
            let payload: serde_json::Value = row.try_get("payload").map_err(DbError::Query)?;

            match serde_json::from_value::<QueueMessage>(payload) {
                Ok(message) => deliveries.push(Delivery {
                    delivery_id,
                    attempts,
                    message,
                }),
                Err(e) => {
                    // Unreadable payloads are dropped.
                    warn!(delivery_id, error = %e, "Discarding undecodable queue message");
                    self.ack(delivery_id).await?;
                }
            }
        }

        deliveries.sort_by_key(|d| d.delivery_id);
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM job_messages WHERE message_id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
