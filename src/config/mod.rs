//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;

/// Fallbacks applied to new work when the caller leaves a knob unset.
#[derive(Debug, Clone, Copy)]
pub struct WorkDefaults {
    pub priority: i32,
    pub retries: i32,
    pub timeout_ms: i64,
}

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Identity string used when this process allocates work.
    pub worker_id: String,
    /// Poller tick interval, in milliseconds.
    pub poll_interval_ms: u64,
    pub work_defaults: WorkDefaults,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            worker_id: std::env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("tradewind-{}", std::process::id())),
            poll_interval_ms: parsed_var("POLL_INTERVAL_MS", 5_000)?,
            work_defaults: WorkDefaults {
                priority: parsed_var("WORK_DEFAULT_PRIORITY", 0)?,
                retries: parsed_var("WORK_DEFAULT_RETRIES", 20)?,
                timeout_ms: parsed_var("WORK_DEFAULT_TIMEOUT_MS", 300_000)?,
            },
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has invalid value {raw:?}"))),
        Err(_) => Ok(default),
    }
}
