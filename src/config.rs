use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{FixedOffset, NaiveTime};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::attendance::engine::AttendancePolicy;
use crate::attendance::retry::RetryPolicy;
use crate::attendance::service::ServiceSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    MySql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub db_max_connections: u32,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,

    pub attendance: AttendanceConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct AttendanceConfig {
    pub store: StoreBackend,
    pub late_threshold: NaiveTime,
    pub utc_offset: FixedOffset,
    pub max_clock_skew: chrono::Duration,
    pub store_timeout: Duration,
    pub query_timeout: Duration,
    pub max_range_days: i64,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub directory_cache_ttl: Duration,
    /// Local time of the daily absent sweep; disabled when unset.
    pub absent_sweep_at: Option<NaiveTime>,
}

impl AttendanceConfig {
    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            policy: AttendancePolicy {
                late_threshold: self.late_threshold,
                max_clock_skew: self.max_clock_skew,
            },
            store_timeout: self.store_timeout,
            query_timeout: self.query_timeout,
            max_range_days: self.max_range_days,
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                backoff: self.retry_backoff,
            },
        }
    }
}

fn parse_time(key: &str, value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .with_context(|| format!("{key} must be HH:MM, got {value:?}"))
}

/// Typed reads over a variable lookup, so tests need not touch the process env.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn required(&self, key: &str) -> anyhow::Result<String> {
        (self.0)(key).with_context(|| format!("{key} must be set"))
    }

    fn or<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match (self.0)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow!("{key} is invalid ({raw:?}): {e}")),
            None => Ok(default),
        }
    }

    fn time(&self, key: &str) -> anyhow::Result<Option<NaiveTime>> {
        (self.0)(key)
            .map(|raw| parse_time(key, raw.trim()))
            .transpose()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let vars = Vars(get);

        let offset_minutes: i32 = vars.or("UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .with_context(|| format!("UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let late_threshold = vars
            .time("LATE_THRESHOLD")?
            .unwrap_or(NaiveTime::from_hms_opt(9, 0, 0).context("default late threshold")?);

        let attendance = AttendanceConfig {
            store: vars.or("ATTENDANCE_STORE", StoreBackend::MySql)?,
            late_threshold,
            utc_offset,
            max_clock_skew: chrono::Duration::seconds(vars.or("MAX_CLOCK_SKEW_SECS", 300)?),
            store_timeout: Duration::from_millis(vars.or("STORE_TIMEOUT_MS", 3_000)?),
            query_timeout: Duration::from_millis(vars.or("QUERY_TIMEOUT_MS", 15_000)?),
            max_range_days: vars.or("MAX_RANGE_DAYS", 731)?,
            retry_attempts: vars.or("RETRY_ATTEMPTS", 3)?,
            retry_backoff: Duration::from_millis(vars.or("RETRY_BACKOFF_MS", 100)?),
            directory_cache_ttl: Duration::from_secs(vars.or("DIRECTORY_CACHE_TTL_SECS", 300)?),
            absent_sweep_at: vars.time("ABSENT_SWEEP_AT")?,
        };

        Ok(Self {
            server_addr: vars.required("SERVER_ADDR")?,
            database_url: vars.required("DATABASE_URL")?,
            jwt_secret: vars.required("JWT_SECRET")?,
            db_max_connections: vars.or("DB_MAX_CONNECTIONS", 10)?,
            rate_protected_per_min: vars.or("RATE_PROTECTED_PER_MIN", 1000)?,
            api_prefix: vars.or("API_PREFIX", "/api".to_string())?,
            log_dir: vars.or("LOG_DIR", "logs".to_string())?,
            log_level: vars.or("LOG_LEVEL", tracing::Level::DEBUG)?,
            attendance,
        })
    }
}
