//! Job rows and the shared completion counter.
//!
//! The counter is the only point where concurrent workers meet. An increment
//! first records the site in `job_sub_tasks`, whose primary key drops a
//! redelivered site, then runs one conditional `UPDATE ... RETURNING` in the
//! same transaction. Postgres row locking serialises callers and exactly one
//! of them sees the count reach the total.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regime_domain::{Job, Pipeline};
use regime_events::JobType;
use regime_id::{JobId, PrisonCode};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};
use tracing::{debug, info};

use super::{parse_column, DbError};
use crate::ports::JobStore;

/// A row from the jobs table.
#[derive(Debug, Clone)]
struct JobRow {
    job_id: String,
    job_type: String,
    total_sub_tasks: Option<i32>,
    completed_sub_tasks: i32,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    successful: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            job_id: row.try_get("job_id")?,
            job_type: row.try_get("job_type")?,
            total_sub_tasks: row.try_get("total_sub_tasks")?,
            completed_sub_tasks: row.try_get("completed_sub_tasks")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            successful: row.try_get("successful")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let count = |column: &'static str, value: i32| {
            u32::try_from(value).map_err(|_| DbError::corrupt(column, value.to_string()))
        };
        Ok(Job {
            job_id: parse_column("job_id", &row.job_id)?,
            job_type: parse_column("job_type", &row.job_type)?,
            total_sub_tasks: row
                .total_sub_tasks
                .map(|total| count("total_sub_tasks", total))
                .transpose()?,
            completed_sub_tasks: count("completed_sub_tasks", row.completed_sub_tasks)?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            successful: row.successful,
        })
    }
}

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional update matched nothing.
    async fn rejection(&self, job_id: JobId, attempt: impl FnOnce(&mut Job) -> Result<(), DbError>) -> DbError {
        match self.get(job_id).await {
            Ok(Some(mut job)) => match attempt(&mut job) {
                Err(e) => e,
                Ok(()) => DbError::JobNotFound(job_id),
            },
            Ok(None) => DbError::JobNotFound(job_id),
            Err(e) => e,
        }
    }
}

fn to_i32(value: u32) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::corrupt("total_sub_tasks", value.to_string()))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, job_type, total_sub_tasks, completed_sub_tasks, started_at, ended_at, successful)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.job_id.to_string())
        .bind(job.job_type.as_str())
        .bind(job.total_sub_tasks.map(to_i32).transpose()?)
        .bind(to_i32(job.completed_sub_tasks)?)
        .bind(job.started_at)
        .bind(job.ended_at)
        .bind(job.successful)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        debug!(job_id = %job.job_id, job_type = %job.job_type, "Created job");
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, DbError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, job_type, total_sub_tasks, completed_sub_tasks, started_at, ended_at, successful
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(Job::try_from).transpose()
    }

    async fn initialise_counts(&self, job_id: JobId, total: u32) -> Result<(), DbError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET total_sub_tasks = $2,
                ended_at = CASE WHEN $2 = 0 THEN now() ELSE ended_at END,
                successful = CASE WHEN $2 = 0 THEN true ELSE successful END
            WHERE job_id = $1 AND total_sub_tasks IS NULL AND ended_at IS NULL
            "#,
        )
        .bind(job_id.to_string())
        .bind(to_i32(total)?)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if updated.rows_affected() == 0 {
            return Err(self
                .rejection(job_id, |job| {
                    job.initialise_counts(total, Utc::now()).map_err(DbError::from)
                })
                .await);
        }

        info!(job_id = %job_id, total_sub_tasks = total, "Initialised job counts");
        Ok(())
    }

    async fn increment_count(
        &self,
        job_id: JobId,
        prison_code: &PrisonCode,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO job_sub_tasks (job_id, prison_code)
            SELECT $1, $2
            WHERE EXISTS (SELECT 1 FROM jobs WHERE job_id = $1)
            ON CONFLICT (job_id, prison_code) DO NOTHING
            "#,
        )
        .bind(job_id.to_string())
        .bind(prison_code.as_str())
        .execute(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        if recorded.rows_affected() == 0 {
            drop(tx);
            if self.get(job_id).await?.is_none() {
                return Err(DbError::JobNotFound(job_id));
            }
            debug!(job_id = %job_id, prison_code = %prison_code, "Sub-task already counted");
            return Ok(false);
        }

        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET completed_sub_tasks = completed_sub_tasks + 1,
                ended_at = CASE WHEN completed_sub_tasks + 1 = total_sub_tasks THEN now() ELSE ended_at END,
                successful = CASE WHEN completed_sub_tasks + 1 = total_sub_tasks THEN true ELSE successful END
            WHERE job_id = $1
              AND ended_at IS NULL
              AND total_sub_tasks IS NOT NULL
              AND completed_sub_tasks < total_sub_tasks
            RETURNING completed_sub_tasks, total_sub_tasks
            "#,
        )
        .bind(job_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(row) = row else {
            drop(tx);
            return Err(self
                .rejection(job_id, |job| {
                    job.record_completion(Utc::now())
                        .map(|_| ())
                        .map_err(DbError::from)
                })
                .await);
        };

        let completed: i32 = row.try_get("completed_sub_tasks").map_err(DbError::Query)?;
        let total: i32 = row.try_get("total_sub_tasks").map_err(DbError::Query)?;
        tx.commit().await.map_err(DbError::Query)?;

        debug!(job_id = %job_id, prison_code = %prison_code, completed, total, "Incremented job count");
        Ok(completed == total)
    }

    async fn fail(&self, job_id: JobId) -> Result<(), DbError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET ended_at = now(), successful = false
            WHERE job_id = $1 AND ended_at IS NULL
            "#,
        )
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if updated.rows_affected() == 0 {
            return Err(self
                .rejection(job_id, |job| job.fail(Utc::now()).map_err(DbError::from))
                .await);
        }
        Ok(())
    }

    async fn last_started(&self, job_type: JobType) -> Result<Option<DateTime<Utc>>, DbError> {
        sqlx::query_scalar("SELECT max(started_at) FROM jobs WHERE job_type = $1")
            .bind(job_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn claim_pipeline_run(
        &self,
        pipeline: Pipeline,
        run_date: NaiveDate,
    ) -> Result<bool, DbError> {
        let claimed = sqlx::query(
            r#"
            INSERT INTO pipeline_runs (pipeline, run_date)
            VALUES ($1, $2)
            ON CONFLICT (pipeline, run_date) DO NOTHING
            "#,
        )
        .bind(pipeline.as_str())
        .bind(run_date)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(claimed.rows_affected() == 1)
    }
}
