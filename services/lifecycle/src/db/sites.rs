//! Rolled-out site configuration.

use async_trait::async_trait;
use regime_id::PrisonCode;
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::{parse_column, DbError};
use crate::ports::{SiteConfig, SiteConfigStore};

struct SiteRow {
    prison_code: String,
    rolled_out: bool,
    max_days_to_expiry: i32,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SiteRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            prison_code: row.try_get("prison_code")?,
            rolled_out: row.try_get("rolled_out")?,
            max_days_to_expiry: row.try_get("max_days_to_expiry")?,
        })
    }
}

impl TryFrom<SiteRow> for SiteConfig {
    type Error = DbError;

    fn try_from(row: SiteRow) -> Result<Self, Self::Error> {
        Ok(SiteConfig {
            prison_code: parse_column("prison_code", &row.prison_code)?,
            rolled_out: row.rolled_out,
            max_days_to_expiry: u32::try_from(row.max_days_to_expiry).map_err(|_| {
                DbError::corrupt("max_days_to_expiry", row.max_days_to_expiry.to_string())
            })?,
        })
    }
}

/// Postgres-backed [`SiteConfigStore`].
#[derive(Clone)]
pub struct PgSiteConfigStore {
    pool: PgPool,
}

impl PgSiteConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SiteConfigStore for PgSiteConfigStore {
    async fn rolled_out(&self) -> Result<Vec<SiteConfig>, DbError> {
        sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT prison_code, rolled_out, max_days_to_expiry
            FROM rollout_prisons
            WHERE rolled_out
            ORDER BY prison_code
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?
        .into_iter()
        .map(SiteConfig::try_from)
        .collect()
    }

    async fn site(&self, prison: &PrisonCode) -> Result<Option<SiteConfig>, DbError> {
        sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT prison_code, rolled_out, max_days_to_expiry
            FROM rollout_prisons
            WHERE prison_code = $1
            "#,
        )
        .bind(prison.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?
        .map(SiteConfig::try_from)
        .transpose()
    }
}
