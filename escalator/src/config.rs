//! Environment-driven configuration.

use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::domain::DndMode;
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:escalator.db?mode=rwc";

/// Tunables of the escalation engine and its sweeper.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Cadence of the bundled sweeper.
    pub sweep_interval: Duration,
    /// Max due records claimed per sweep.
    pub sweep_batch_size: u32,
    /// How long a claimed record stays invisible to other sweeps.
    pub claim_timeout: Duration,
    /// Upper bound on one channel dispatch. Zero disables it.
    pub dispatch_timeout: Duration,
    /// Zone in which do-not-disturb windows are evaluated.
    pub dnd_timezone: Tz,
    pub dnd_mode: DndMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 100,
            claim_timeout: Duration::from_secs(300),
            dispatch_timeout: Duration::from_secs(60),
            dnd_timezone: Tz::UTC,
            dnd_mode: DndMode::SameDay,
        }
    }
}

/// SMTP relay settings. Email is only logged when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    /// Overrides the startup log filter, e.g. "escalator=debug,sqlx=warn".
    pub log_filter: Option<String>,
    pub http_timeout: Duration,
    pub http_max_rate_limit_retries: u32,
    pub smtp: Option<SmtpConfig>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            sweep_interval: secs(&get, "ESCALATOR_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            sweep_batch_size: parse(&get, "ESCALATOR_SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?,
            claim_timeout: secs(&get, "ESCALATOR_CLAIM_TIMEOUT_SECS", defaults.claim_timeout)?,
            dispatch_timeout: secs(
                &get,
                "ESCALATOR_DISPATCH_TIMEOUT_SECS",
                defaults.dispatch_timeout,
            )?,
            dnd_timezone: match get("ESCALATOR_DND_TIMEZONE") {
                Some(name) => name.parse::<Tz>().map_err(|_| {
                    Error::config(format!("ESCALATOR_DND_TIMEZONE: unknown timezone '{}'", name))
                })?,
                None => defaults.dnd_timezone,
            },
            dnd_mode: if parse(&get, "ESCALATOR_DND_OVERNIGHT_WINDOWS", false)? {
                DndMode::Overnight
            } else {
                DndMode::SameDay
            },
        };

        if engine.sweep_interval.is_zero() {
            return Err(Error::config("ESCALATOR_SWEEP_INTERVAL_SECS must be positive"));
        }
        if engine.sweep_batch_size == 0 {
            return Err(Error::config("ESCALATOR_SWEEP_BATCH_SIZE must be positive"));
        }

        let smtp = match get("ESCALATOR_SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse(&get, "ESCALATOR_SMTP_PORT", 587)?,
                username: get("ESCALATOR_SMTP_USERNAME"),
                password: get("ESCALATOR_SMTP_PASSWORD"),
                from: get("ESCALATOR_SMTP_FROM").ok_or_else(|| {
                    Error::config("ESCALATOR_SMTP_FROM is required when ESCALATOR_SMTP_HOST is set")
                })?,
            }),
            None => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_dir: get("ESCALATOR_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_filter: get("ESCALATOR_LOG_FILTER"),
            http_timeout: secs(&get, "ESCALATOR_HTTP_TIMEOUT_SECS", Duration::from_secs(30))?,
            http_max_rate_limit_retries: parse(&get, "ESCALATOR_HTTP_MAX_RATE_LIMIT_RETRIES", 3)?,
            smtp,
            engine,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("{}: invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parse(get, key, default.as_secs()).map(Duration::from_secs)
}
