//! Active scoring policy and alert threshold configuration
//!
//! Both are singletons maintained by an admin workflow. The batch jobs only
//! read them; `validate` enforces the rules the admin workflow applies before
//! saving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PolicyValidationError;

const MAX_NOTES_LENGTH: usize = 1000;
const MAX_QUEUE_THRESHOLD: i64 = 100_000;

/// Weighted rule policy driving the per-appointment risk score
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RiskPolicy {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub lookback_days: i32,
    pub max_history_events_per_actor: i32,
    pub min_client_history_risk_events: i32,
    pub min_provider_history_risk_events: i32,
    pub weight_client_not_confirmed: i32,
    pub weight_provider_not_confirmed: i32,
    pub weight_both_not_confirmed_bonus: i32,
    pub weight_window_within_24_hours: i32,
    pub weight_window_within_6_hours: i32,
    pub weight_window_within_2_hours: i32,
    pub weight_client_history_risk: i32,
    pub weight_provider_history_risk: i32,
    pub low_threshold_score: i32,
    pub medium_threshold_score: i32,
    pub high_threshold_score: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RiskPolicy {
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        check_range("lookback_days", self.lookback_days.into(), 1, 365)?;
        check_range(
            "max_history_events_per_actor",
            self.max_history_events_per_actor.into(),
            1,
            200,
        )?;
        check_range(
            "min_client_history_risk_events",
            self.min_client_history_risk_events.into(),
            1,
            50,
        )?;
        check_range(
            "min_provider_history_risk_events",
            self.min_provider_history_risk_events.into(),
            1,
            50,
        )?;

        let weights = [
            ("weight_client_not_confirmed", self.weight_client_not_confirmed),
            ("weight_provider_not_confirmed", self.weight_provider_not_confirmed),
            ("weight_both_not_confirmed_bonus", self.weight_both_not_confirmed_bonus),
            ("weight_window_within_24_hours", self.weight_window_within_24_hours),
            ("weight_window_within_6_hours", self.weight_window_within_6_hours),
            ("weight_window_within_2_hours", self.weight_window_within_2_hours),
            ("weight_client_history_risk", self.weight_client_history_risk),
            ("weight_provider_history_risk", self.weight_provider_history_risk),
        ];
        for (field, weight) in weights {
            check_range(field, weight.into(), 0, 100)?;
        }

        check_range("low_threshold_score", self.low_threshold_score.into(), 0, 100)?;
        check_range("medium_threshold_score", self.medium_threshold_score.into(), 0, 100)?;
        check_range("high_threshold_score", self.high_threshold_score.into(), 0, 100)?;

        if self.low_threshold_score > self.medium_threshold_score
            || self.medium_threshold_score > self.high_threshold_score
        {
            return Err(PolicyValidationError::ThresholdOrder(
                "expected low <= medium <= high".to_string(),
            ));
        }

        check_notes(self.notes.as_deref())
    }
}

/// Warning/critical thresholds for the three fleet-wide KPIs
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AlertThresholdConfig {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub no_show_rate_warning_percent: f64,
    pub no_show_rate_critical_percent: f64,
    pub high_risk_queue_warning_count: i64,
    pub high_risk_queue_critical_count: i64,
    /// Lower is worse: critical sits at or below warning
    pub reminder_send_success_warning_percent: f64,
    pub reminder_send_success_critical_percent: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AlertThresholdConfig {
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        check_percent("no_show_rate_warning_percent", self.no_show_rate_warning_percent)?;
        check_percent("no_show_rate_critical_percent", self.no_show_rate_critical_percent)?;
        if self.no_show_rate_warning_percent > self.no_show_rate_critical_percent {
            return Err(PolicyValidationError::ThresholdOrder(
                "no-show rate warning must be <= critical".to_string(),
            ));
        }

        check_range(
            "high_risk_queue_warning_count",
            self.high_risk_queue_warning_count,
            0,
            MAX_QUEUE_THRESHOLD,
        )?;
        check_range(
            "high_risk_queue_critical_count",
            self.high_risk_queue_critical_count,
            0,
            MAX_QUEUE_THRESHOLD,
        )?;
        if self.high_risk_queue_warning_count > self.high_risk_queue_critical_count {
            return Err(PolicyValidationError::ThresholdOrder(
                "high-risk queue warning must be <= critical".to_string(),
            ));
        }

        check_percent(
            "reminder_send_success_warning_percent",
            self.reminder_send_success_warning_percent,
        )?;
        check_percent(
            "reminder_send_success_critical_percent",
            self.reminder_send_success_critical_percent,
        )?;
        if self.reminder_send_success_critical_percent > self.reminder_send_success_warning_percent
        {
            return Err(PolicyValidationError::ThresholdOrder(
                "reminder success critical must be <= warning".to_string(),
            ));
        }

        check_notes(self.notes.as_deref())
    }
}

fn check_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), PolicyValidationError> {
    if value < min || value > max {
        return Err(PolicyValidationError::OutOfRange {
            field,
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(())
}

fn check_percent(field: &'static str, value: f64) -> Result<(), PolicyValidationError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(PolicyValidationError::OutOfRange {
            field,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(())
}

fn check_notes(notes: Option<&str>) -> Result<(), PolicyValidationError> {
    match notes.map(str::trim) {
        Some(text) if text.chars().count() > MAX_NOTES_LENGTH => {
            Err(PolicyValidationError::NotesTooLong {
                max: MAX_NOTES_LENGTH,
            })
        }
        _ => Ok(()),
    }
}
