//! Collaborator interfaces consumed by the scorer and the alert evaluator
//!
//! Persistence of domain entities lives outside this crate's core. The services
//! only talk to these traits; [`postgres`] provides the production adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AlertThresholdConfig, Appointment, AppointmentRiskState, AuditRecord, KpiFilters, KpiSnapshot,
    ReminderDispatchStatus, RiskHistoryEntry, RiskPolicy, UserSummary,
};

pub mod postgres;

pub use postgres::{
    PgAppointmentStore, PgAuditSink, PgKpiSource, PgPolicyStore, PgReminderDispatchStore,
    PgUserDirectory,
};

/// Read-only access to the active scoring policy and threshold configuration
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_active_policy(&self) -> Result<Option<RiskPolicy>, StoreError>;

    async fn get_active_thresholds(&self) -> Result<Option<AlertThresholdConfig>, StoreError>;
}

/// Appointment candidates, actor history counts and risk-state writes
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Appointments whose window starts in `[from_utc, to_utc]`, at most `limit`
    async fn get_risk_candidates(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// No-show-class outcomes caused by the client in the window, capped at `limit`
    async fn count_client_risk_events(
        &self,
        client_id: Uuid,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError>;

    /// No-show-class outcomes caused by the provider in the window, capped at `limit`
    async fn count_provider_risk_events(
        &self,
        provider_id: Uuid,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError>;

    async fn save_risk_state(
        &self,
        appointment_id: Uuid,
        state: &AppointmentRiskState,
    ) -> Result<(), StoreError>;

    async fn append_history(&self, entry: RiskHistoryEntry) -> Result<(), StoreError>;
}

/// Fleet-wide KPI rollup
#[async_trait]
pub trait KpiSource: Send + Sync {
    async fn get_kpis(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        filters: &KpiFilters,
    ) -> Result<KpiSnapshot, StoreError>;
}

/// Reminder dispatch outcome counts
#[async_trait]
pub trait ReminderDispatchStore: Send + Sync {
    async fn count_outcomes(
        &self,
        status: ReminderDispatchStatus,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}

/// User roster used to find admin recipients
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError>;
}

/// Append-only audit log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_audit_record(&self, record: AuditRecord) -> Result<(), StoreError>;
}
