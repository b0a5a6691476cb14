//! Database layer for the lifecycle worker.
//!
//! This module provides:
//! - Connection pool management
//! - Allocation, attendance and waiting-list persistence
//! - Job counters, the work queue and the event outbox
//! - Site configuration
//!
//! The database layer uses SQLx with Postgres.

mod error;
mod jobs;
mod lifecycle;
mod outbox;
mod queue;
mod sites;

pub use error::DbError;
pub use jobs::PgJobStore;
pub use lifecycle::PgLifecycleStore;
pub use outbox::PgOutbox;
pub use queue::PgJobQueue;
pub use sites::PgSiteConfigStore;

use std::path::PathBuf;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Pool settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection before a query fails.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/regime";

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Reads `DATABASE_URL`, `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_or("DATABASE_URL", defaults.database_url.clone()),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            ..defaults
        }
    }
}

/// Where the schema files may live, relative to how the binary was started.
fn migration_dirs() -> [PathBuf; 3] {
    [
        PathBuf::from("migrations"),
        PathBuf::from("services/lifecycle/migrations"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    ]
}

/// Shared Postgres pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database pool ready");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips a trivial query.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Applies pending migrations from the first migrations directory found.
    ///
    /// Deployments normally migrate ahead of rollout; this runs in dev mode.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let dirs = migration_dirs();
        let Some(dir) = dirs.iter().find(|dir| dir.is_dir()) else {
            let tried = dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DbError::MigrationDirNotFound { tried });
        };

        info!(migrations_dir = %dir.display(), "Running database migrations");
        Migrator::new(dir.clone())
            .await
            .map_err(DbError::Migration)?
            .run(&self.pool)
            .await
            .map_err(DbError::Migration)?;
        info!("Database migrations complete");
        Ok(())
    }

    pub fn lifecycle_store(&self) -> PgLifecycleStore {
        PgLifecycleStore::new(self.pool.clone())
    }

    pub fn job_store(&self) -> PgJobStore {
        PgJobStore::new(self.pool.clone())
    }

    pub fn job_queue(&self, lease: Duration) -> PgJobQueue {
        PgJobQueue::new(self.pool.clone(), lease)
    }

    pub fn outbox(&self) -> PgOutbox {
        PgOutbox::new(self.pool.clone())
    }

    pub fn site_config_store(&self) -> PgSiteConfigStore {
        PgSiteConfigStore::new(self.pool.clone())
    }
}

/// Parses a stored text column into its domain type.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> Result<T, DbError>
where
    T: std::str::FromStr,
{
    value.parse().map_err(|_| DbError::corrupt(column, value))
}
