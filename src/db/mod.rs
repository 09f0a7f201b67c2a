//! Postgres pool for the worker
//!
//! The tables are owned and migrated by the marketplace application; startup
//! only connects and checks that the tables this crate reads are present.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

const REQUIRED_TABLES: [&str; 9] = [
    "service_appointments",
    "service_requests",
    "service_appointment_no_show_queue_items",
    "service_appointment_histories",
    "no_show_risk_policies",
    "no_show_alert_thresholds",
    "appointment_reminder_dispatches",
    "users",
    "admin_audit_logs",
];

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connect(String),

    #[error("Database probe failed: {0}")]
    Probe(String),

    #[error("Required table is missing: {0}")]
    MissingTable(&'static str),
}

/// Open the pool. Connections are checked before use since the worker idles
/// between ticks.
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!(url = %config.database_url_masked(), "Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::Connect(e.to_string()))?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Fail fast when the schema is not the one the adapters query.
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    for table in REQUIRED_TABLES {
        let (present,) = sqlx::query_as::<_, (bool,)>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))?;

        if !present {
            return Err(DbError::MissingTable(table));
        }
    }

    Ok(())
}
