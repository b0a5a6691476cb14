//! Database error types.

use regime_domain::JobStateError;
use regime_id::JobId;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// None of the known migration directories exist.
    #[error("no migrations directory found (tried {tried}); run from the repo root or services/lifecycle")]
    MigrationDirNotFound { tried: String },

    /// A stored value no longer parses into its domain type.
    #[error("corrupt {column} value: {value}")]
    Corrupt { column: &'static str, value: String },

    /// No job with this id.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// A job counter update the job state machine does not allow.
    #[error("job state violation: {0}")]
    JobState(#[from] JobStateError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        DbError::Corrupt {
            column,
            value: value.into(),
        }
    }
}
