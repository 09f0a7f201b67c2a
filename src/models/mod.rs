//! Data models for no-show risk scoring and operational alerting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod policy;
pub use policy::*;

/// Appointment lifecycle status. Scoring reads it but never changes it.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "service_appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingProviderConfirmation,
    Confirmed,
    RescheduleRequested,
    Arrived,
    InProgress,
    Completed,
    CancelledByClient,
    CancelledByProvider,
    RejectedByProvider,
    ExpiredWithoutProviderAction,
}

/// Discrete no-show risk level
#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[sqlx(type_name = "no_show_risk_level", rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Resolve the level for a clamped score against the policy thresholds.
    pub fn from_score(score: i32, medium_threshold: i32, high_threshold: i32) -> Self {
        if score >= high_threshold {
            RiskLevel::High
        } else if score >= medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Medium and High levels warrant a preventive notification on escalation.
    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::Medium | RiskLevel::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schedulable appointment with its attached risk columns
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Appointment {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub status: AppointmentStatus,
    pub window_start_utc: DateTime<Utc>,
    pub window_end_utc: DateTime<Utc>,
    /// `None` means the party has not answered yet, which counts as unconfirmed
    pub client_presence_confirmed: Option<bool>,
    pub provider_presence_confirmed: Option<bool>,
    pub no_show_risk_score: Option<i32>,
    pub no_show_risk_level: Option<RiskLevel>,
    pub no_show_risk_reasons: Option<String>,
    pub no_show_risk_calculated_at_utc: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn client_confirmed(&self) -> bool {
        self.client_presence_confirmed == Some(true)
    }

    pub fn provider_confirmed(&self) -> bool {
        self.provider_presence_confirmed == Some(true)
    }

    /// Risk state stored before the current evaluation, if any
    pub fn risk_snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            score: self.no_show_risk_score,
            level: self.no_show_risk_level,
            reasons: self.no_show_risk_reasons.clone(),
        }
    }

    /// Overwrite the attached risk columns with a fresh state
    pub fn apply_risk_state(&mut self, state: &AppointmentRiskState) {
        self.no_show_risk_score = Some(state.score);
        self.no_show_risk_level = Some(state.level);
        self.no_show_risk_reasons = Some(state.reasons.clone());
        self.no_show_risk_calculated_at_utc = Some(state.calculated_at_utc);
    }
}

/// Persisted risk state of one appointment, overwritten on every evaluation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AppointmentRiskState {
    pub score: i32,
    pub level: RiskLevel,
    /// Comma-joined distinct reason codes
    pub reasons: String,
    pub calculated_at_utc: DateTime<Utc>,
}

/// Previously stored score/level/reasons, all absent before the first evaluation
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RiskSnapshot {
    pub score: Option<i32>,
    pub level: Option<RiskLevel>,
    pub reasons: Option<String>,
}

impl RiskSnapshot {
    /// Whether a freshly computed state differs from this snapshot
    pub fn differs_from(&self, state: &AppointmentRiskState) -> bool {
        self.score != Some(state.score)
            || self.level != Some(state.level)
            || self.reasons.as_deref() != Some(state.reasons.as_str())
    }
}

/// Who caused an appointment history entry
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "appointment_actor_role", rename_all = "lowercase")]
pub enum ActorRole {
    Client,
    Provider,
    Admin,
    System,
}

/// Immutable append-only history record for an appointment
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RiskHistoryEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub previous_status: AppointmentStatus,
    pub new_status: AppointmentStatus,
    pub actor_role: ActorRole,
    pub reason: String,
    pub metadata: serde_json::Value,
    pub occurred_at_utc: DateTime<Utc>,
}

/// Immutable audit-log record for admin-visible actions
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_user_id: Uuid,
    pub actor_email: String,
    pub action: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Optional slicing of the KPI rollup
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct KpiFilters {
    pub city: Option<String>,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    /// How far back cancellations count as no-show-class outcomes
    pub cancellation_no_show_window_hours: i64,
}

/// Rollup counts produced by the external KPI aggregator
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct KpiSnapshot {
    pub no_show_count: i64,
    pub base_count: i64,
    pub high_risk_queue_count: i64,
}

/// Outcome of a single appointment reminder dispatch
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "reminder_dispatch_status", rename_all = "snake_case")]
pub enum ReminderDispatchStatus {
    Pending,
    Sent,
    FailedRetryable,
    FailedPermanent,
    Cancelled,
}

/// User roles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Provider,
    Admin,
}

/// Minimal user projection needed for recipient resolution
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct UserSummary {
    pub id: Uuid,
    pub role: UserRole,
    pub is_active: bool,
}

/// Render a user id the way the notification transport expects it
pub fn recipient_id(user_id: Uuid) -> String {
    user_id.simple().to_string()
}
