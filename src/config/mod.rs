//! Configuration management for the no-show guard
//!
//! Values come from environment variables (a `.env` file is honoured). Every
//! tunable has a documented default and range: unparsable values fall back to
//! the default and out-of-range values are clamped to the nearest bound, so a
//! typo never stops the scheduled jobs.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Tunables for the risk scorer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskScoringSettings {
    /// How far ahead candidate windows are scanned (1-168h)
    pub lookahead_hours: i64,
    /// How far back already-started windows are still rescored (0-240min)
    pub include_past_window_minutes: i64,
}

impl Default for RiskScoringSettings {
    fn default() -> Self {
        Self {
            lookahead_hours: 24,
            include_past_window_minutes: 30,
        }
    }
}

/// Tunables for the operational alert evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub enabled: bool,
    /// KPI rollup window (1-720h)
    pub evaluation_window_hours: i64,
    /// Passed through to the KPI aggregator (1-168h)
    pub cancellation_no_show_window_hours: i64,
    /// Suppression window per severity tier (1-1440min)
    pub cooldown_minutes: i64,
    /// Extra recipients: user ids or raw channel strings
    pub recipients: Vec<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_window_hours: 24,
            cancellation_no_show_window_hours: 24,
            cooldown_minutes: 60,
            recipients: Vec::new(),
        }
    }
}

/// Tunables for the background worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub enabled: bool,
    /// Tick period (5-3600s)
    pub interval_seconds: u64,
    /// Candidates fetched per scoring run (1-2000)
    pub batch_size: usize,
}

impl WorkerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            batch_size: 200,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Log level (RUST_LOG)
    pub log_level: String,

    pub worker: WorkerSettings,

    pub scoring: RiskScoringSettings,

    pub alerts: AlertSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let db_max_connections =
            parse_clamped(lookup("DB_MAX_CONNECTIONS").as_deref(), 5, 1, 100) as u32;

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let worker = WorkerSettings {
            enabled: parse_bool(lookup("NOSHOW_RISK_WORKER_ENABLED").as_deref(), true),
            interval_seconds: parse_clamped(
                lookup("NOSHOW_RISK_WORKER_INTERVAL_SECONDS").as_deref(),
                60,
                5,
                3600,
            ) as u64,
            batch_size: parse_clamped(lookup("NOSHOW_RISK_BATCH_SIZE").as_deref(), 200, 1, 2000)
                as usize,
        };

        let scoring = RiskScoringSettings {
            lookahead_hours: parse_clamped(
                lookup("NOSHOW_RISK_LOOKAHEAD_HOURS").as_deref(),
                24,
                1,
                168,
            ),
            include_past_window_minutes: parse_clamped(
                lookup("NOSHOW_RISK_INCLUDE_PAST_WINDOW_MINUTES").as_deref(),
                30,
                0,
                240,
            ),
        };

        let alerts = AlertSettings {
            enabled: parse_bool(lookup("NOSHOW_ALERTS_ENABLED").as_deref(), true),
            evaluation_window_hours: parse_clamped(
                lookup("NOSHOW_ALERTS_EVALUATION_WINDOW_HOURS").as_deref(),
                24,
                1,
                720,
            ),
            cancellation_no_show_window_hours: parse_clamped(
                lookup("NOSHOW_ALERTS_CANCELLATION_NO_SHOW_WINDOW_HOURS").as_deref(),
                24,
                1,
                168,
            ),
            cooldown_minutes: parse_clamped(
                lookup("NOSHOW_ALERTS_COOLDOWN_MINUTES").as_deref(),
                60,
                1,
                1440,
            ),
            recipients: parse_list(lookup("NOSHOW_ALERTS_RECIPIENTS").as_deref()),
        };

        Ok(Config {
            database_url,
            db_max_connections,
            log_level,
            worker,
            scoring,
            alerts,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

/// Parse an integer, falling back to `default` when absent or malformed and
/// clamping into `[min, max]` otherwise.
pub fn parse_clamped(raw: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    match raw.and_then(|value| value.trim().parse::<i64>().ok()) {
        Some(parsed) => parsed.clamp(min, max),
        None => default,
    }
}

/// Parse a boolean flag, falling back to `default` when absent or malformed.
pub fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if value == "true" => true,
        Some(value) if value == "false" => false,
        _ => default,
    }
}

fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
