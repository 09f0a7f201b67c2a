//! Threshold comparison shared by the operational alert checks
//!
//! Each metric carries an explicit polarity so a single routine classifies all
//! three KPIs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::models::AlertThresholdConfig;

/// Which direction of movement makes a metric worse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    HigherIsWorse,
    LowerIsWorse,
}

/// Alert severity; `Critical` orders above `Warning`
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Cooldown tier key
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("Warning"),
            Severity::Critical => f.write_str("Critical"),
        }
    }
}

/// Fleet-wide KPI under watch
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    NoShowRatePercent,
    HighRiskQueueCount,
    ReminderSendSuccessRatePercent,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::NoShowRatePercent => "NoShowRatePercent",
            Metric::HighRiskQueueCount => "HighRiskQueueCount",
            Metric::ReminderSendSuccessRatePercent => "ReminderSendSuccessRatePercent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::NoShowRatePercent => "No-show rate (%)",
            Metric::HighRiskQueueCount => "High-risk queue (count)",
            Metric::ReminderSendSuccessRatePercent => "Reminder send success (%)",
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Metric::NoShowRatePercent | Metric::HighRiskQueueCount => Polarity::HigherIsWorse,
            Metric::ReminderSendSuccessRatePercent => Polarity::LowerIsWorse,
        }
    }

    /// Counts print as integers, rates with one decimal
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Metric::HighRiskQueueCount => format!("{:.0}", value),
            _ => format!("{:.1}", value),
        }
    }
}

/// Warning/critical pair for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricThreshold {
    pub warning: f64,
    pub critical: f64,
}

impl MetricThreshold {
    pub fn for_metric(metric: Metric, config: &AlertThresholdConfig) -> Self {
        match metric {
            Metric::NoShowRatePercent => Self {
                warning: config.no_show_rate_warning_percent,
                critical: config.no_show_rate_critical_percent,
            },
            Metric::HighRiskQueueCount => Self {
                warning: config.high_risk_queue_warning_count as f64,
                critical: config.high_risk_queue_critical_count as f64,
            },
            Metric::ReminderSendSuccessRatePercent => Self {
                warning: config.reminder_send_success_warning_percent,
                critical: config.reminder_send_success_critical_percent,
            },
        }
    }
}

/// A metric that crossed its warning or critical threshold in this cycle
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Breach {
    pub metric: Metric,
    pub severity: Severity,
    pub current_value: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

/// Classify a value against a threshold pair. Critical is checked first;
/// both comparisons are inclusive.
pub fn classify(value: f64, threshold: MetricThreshold, polarity: Polarity) -> Option<Severity> {
    let breaches = |limit: f64| match polarity {
        Polarity::HigherIsWorse => value >= limit,
        Polarity::LowerIsWorse => value <= limit,
    };

    if breaches(threshold.critical) {
        Some(Severity::Critical)
    } else if breaches(threshold.warning) {
        Some(Severity::Warning)
    } else {
        None
    }
}

pub fn evaluate_metric(metric: Metric, value: f64, threshold: MetricThreshold) -> Option<Breach> {
    classify(value, threshold, metric.polarity()).map(|severity| Breach {
        metric,
        severity,
        current_value: value,
        warning_threshold: threshold.warning,
        critical_threshold: threshold.critical,
    })
}

/// Highest severity across the breach set, `None` when nothing breached
pub fn overall_severity(breaches: &[Breach]) -> Option<Severity> {
    breaches.iter().map(|breach| breach.severity).max()
}

/// Severity descending, then metric name ascending
pub fn sort_breaches(breaches: &mut [Breach]) {
    breaches.sort_by(|a, b| match b.severity.cmp(&a.severity) {
        Ordering::Equal => a.metric.name().cmp(b.metric.name()),
        other => other,
    });
}

/// Percentage with one decimal, halves rounded away from zero; zero when the
/// denominator is empty. Computed in integer tenths so exact midpoints such
/// as 41/80 = 51.25% land on 51.3.
pub fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }

    let num = i128::from(numerator.unsigned_abs());
    let den = i128::from(denominator);
    let tenths = (num * 2000 + den) / (den * 2);
    let signed = if numerator < 0 { -tenths } else { tenths };

    signed as f64 / 10.0
}

/// Share of finished reminder dispatches that were sent. With nothing
/// attempted in the window the rate is reported as 100%.
pub fn reminder_success_rate(sent: i64, failed_permanent: i64, failed_retryable: i64) -> f64 {
    let finished = sent + failed_permanent + failed_retryable;
    if finished <= 0 {
        return 100.0;
    }
    percentage(sent, finished)
}
