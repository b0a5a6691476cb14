use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;

use crate::db::DbConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    pub prisoner_search_url: String,
    pub prison_api_url: String,
    pub worker: QueueWorkerConfig,
    pub schedule: ScheduleConfig,
}

/// Queue consumption settings.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Messages handled at once.
    pub concurrency: usize,
    /// How long to sleep when the queue is empty.
    pub poll_interval: Duration,
    /// How long a claimed message stays invisible to other workers.
    pub lease: Duration,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(300),
        }
    }
}

/// Local time of day each pipeline starts.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub allocations: NaiveTime,
    /// Runs late so that allocations ending today are still attended today.
    pub deallocations: NaiveTime,
    pub attendances: NaiveTime,
    /// How often the scheduler checks whether a pipeline is due.
    pub check_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            allocations: NaiveTime::from_hms_opt(0, 15, 0).unwrap_or(NaiveTime::MIN),
            deallocations: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            attendances: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN),
            check_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("REGIME_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("REGIME_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("REGIME_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let database = DbConfig::from_env();

        let prisoner_search_url = std::env::var("PRISONER_SEARCH_URL")
            .unwrap_or_else(|_| "http://localhost:8081".to_string());
        let prison_api_url =
            std::env::var("PRISON_API_URL").unwrap_or_else(|_| "http://localhost:8082".to_string());

        let defaults = QueueWorkerConfig::default();
        let worker = QueueWorkerConfig {
            concurrency: env_parse("REGIME_WORKER_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            poll_interval: env_parse("REGIME_QUEUE_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            lease: env_parse("REGIME_QUEUE_LEASE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease),
        };

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            allocations: env_time("REGIME_SCHEDULE_ALLOCATIONS")?.unwrap_or(defaults.allocations),
            deallocations: env_time("REGIME_SCHEDULE_DEALLOCATIONS")?
                .unwrap_or(defaults.deallocations),
            attendances: env_time("REGIME_SCHEDULE_ATTENDANCES")?.unwrap_or(defaults.attendances),
            check_interval: defaults.check_interval,
        };

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            prisoner_search_url,
            prison_api_url,
            worker,
            schedule,
        })
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {name}: {value}")),
        Err(_) => Ok(None),
    }
}

fn env_time(name: &str) -> Result<Option<NaiveTime>> {
    match std::env::var(name) {
        Ok(value) => parse_time_of_day(&value)
            .map(Some)
            .with_context(|| format!("invalid {name}: {value}")),
        Err(_) => Ok(None),
    }
}

/// Parses `HH:MM`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
}
