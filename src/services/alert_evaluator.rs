//! Operational alerting on fleet-wide no-show KPIs
//!
//! One evaluation rolls the KPIs up over the configured window, compares them
//! to the active thresholds and sends at most one alert per cycle to the admin
//! roster plus any configured recipients. A per-severity cooldown keeps
//! repeated cycles from re-alerting.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::breach::{
    evaluate_metric, overall_severity, percentage, reminder_success_rate, sort_breaches, Breach,
    Metric, MetricThreshold, Severity,
};
use super::cooldown::CooldownStore;
use crate::cancellation::CancellationToken;
use crate::clock::Clock;
use crate::config::AlertSettings;
use crate::error::ServiceResult;
use crate::models::{
    recipient_id, AlertThresholdConfig, AuditRecord, KpiFilters, ReminderDispatchStatus,
    UserRole, UserSummary,
};
use crate::notifications::Notifier;
use crate::repositories::{AuditSink, KpiSource, PolicyStore, ReminderDispatchStore, UserDirectory};

const SYSTEM_ACTOR_EMAIL: &str = "system@internal";
const AUDIT_ACTION: &str = "NoShowOperationalAlertDispatched";
const AUDIT_TARGET_TYPE: &str = "NoShowAlertThresholdConfiguration";
const ALERT_DEEP_LINK: &str = "/AdminHome";

/// Current values of the three watched KPIs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValues {
    pub no_show_rate_percent: f64,
    pub high_risk_queue_count: i64,
    pub reminder_send_success_rate_percent: f64,
}

impl MetricValues {
    fn value_of(&self, metric: Metric) -> f64 {
        match metric {
            Metric::NoShowRatePercent => self.no_show_rate_percent,
            Metric::HighRiskQueueCount => self.high_risk_queue_count as f64,
            Metric::ReminderSendSuccessRatePercent => self.reminder_send_success_rate_percent,
        }
    }
}

/// Breaches for this cycle, ordered severity first then metric name
pub fn detect_breaches(values: &MetricValues, thresholds: &AlertThresholdConfig) -> Vec<Breach> {
    let mut breaches: Vec<Breach> = [
        Metric::NoShowRatePercent,
        Metric::HighRiskQueueCount,
        Metric::ReminderSendSuccessRatePercent,
    ]
    .into_iter()
    .filter_map(|metric| {
        evaluate_metric(
            metric,
            values.value_of(metric),
            MetricThreshold::for_metric(metric, thresholds),
        )
    })
    .collect();

    sort_breaches(&mut breaches);
    breaches
}

/// Active admins plus configured extras, deduplicated case-insensitively in
/// first-seen order. Configured entries that parse as user ids are rendered
/// like admin ids; anything else is kept as a lowercased channel string.
pub fn resolve_recipients(users: &[UserSummary], configured: &[String]) -> Vec<String> {
    let admins = users
        .iter()
        .filter(|user| user.role == UserRole::Admin && user.is_active)
        .map(|user| recipient_id(user.id));

    let extras = configured
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| match Uuid::parse_str(raw) {
            Ok(id) => recipient_id(id),
            Err(_) => raw.to_lowercase(),
        });

    let mut seen = HashSet::new();
    admins
        .chain(extras)
        .filter(|recipient| seen.insert(recipient.to_lowercase()))
        .collect()
}

/// Subject and body of the single alert sent per cycle
pub fn build_alert_message(
    severity: Severity,
    window_hours: i64,
    from_utc: DateTime<Utc>,
    to_utc: DateTime<Utc>,
    values: &MetricValues,
    breaches: &[Breach],
) -> (String, String) {
    let subject = match severity {
        Severity::Critical => "CRITICAL no-show alert in operations",
        Severity::Warning => "No-show alert in operations",
    }
    .to_string();

    let mut body = format!(
        "Window: last {}h ({} - {} UTC)\n\
         No-show rate: {:.1}%\n\
         High-risk queue: {}\n\
         Reminder send success: {:.1}%\n\
         Breaches:",
        window_hours,
        from_utc.format("%d/%m %H:%M"),
        to_utc.format("%d/%m %H:%M"),
        values.no_show_rate_percent,
        values.high_risk_queue_count,
        values.reminder_send_success_rate_percent,
    );

    for breach in breaches {
        body.push_str(&format!(
            "\n- {} [{}]: current {} | warning {} | critical {}",
            breach.metric.label(),
            breach.severity.label(),
            breach.metric.format_value(breach.current_value),
            breach.metric.format_value(breach.warning_threshold),
            breach.metric.format_value(breach.critical_threshold),
        ));
    }

    (subject, body)
}

/// Threshold monitor with per-severity cooldown
pub struct AlertEvaluator {
    policies: Arc<dyn PolicyStore>,
    kpis: Arc<dyn KpiSource>,
    reminders: Arc<dyn ReminderDispatchStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    cooldowns: Arc<dyn CooldownStore>,
    clock: Arc<dyn Clock>,
    settings: AlertSettings,
}

impl AlertEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        kpis: Arc<dyn KpiSource>,
        reminders: Arc<dyn ReminderDispatchStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        cooldowns: Arc<dyn CooldownStore>,
        clock: Arc<dyn Clock>,
        settings: AlertSettings,
    ) -> Self {
        Self {
            policies,
            kpis,
            reminders,
            users,
            notifier,
            audit,
            cooldowns,
            clock,
            settings,
        }
    }

    /// Run one evaluation cycle. Returns the number of successful dispatches.
    pub async fn evaluate_and_notify(&self, token: &CancellationToken) -> ServiceResult<usize> {
        if !self.settings.enabled {
            return Ok(0);
        }

        token.check()?;
        let thresholds = match self.policies.get_active_thresholds().await? {
            Some(thresholds) => thresholds,
            None => {
                tracing::warn!(
                    "No-show alert evaluation skipped: no active threshold configuration"
                );
                return Ok(0);
            }
        };

        let now = self.clock.now();
        let window_hours = self.settings.evaluation_window_hours;
        let from_utc = now - Duration::hours(window_hours);

        let values = self.collect_metrics(from_utc, now, token).await?;
        let breaches = detect_breaches(&values, &thresholds);
        let severity = match overall_severity(&breaches) {
            Some(severity) => severity,
            None => return Ok(0),
        };

        if self.in_cooldown(severity, now) {
            tracing::debug!(severity = %severity, "No-show alert suppressed by cooldown");
            return Ok(0);
        }

        token.check()?;
        let users = self.users.list_users().await?;
        let recipients = resolve_recipients(&users, &self.settings.recipients);
        if recipients.is_empty() {
            tracing::warn!(severity = %severity, "No-show alert has no recipients");
            return Ok(0);
        }

        let (subject, body) =
            build_alert_message(severity, window_hours, from_utc, now, &values, &breaches);

        let mut sent = 0;
        for recipient in &recipients {
            token.check()?;
            match self
                .notifier
                .send(recipient, &subject, &body, ALERT_DEEP_LINK)
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(
                        recipient = %recipient,
                        severity = %severity,
                        error = %e,
                        "Failed to send operational no-show alert"
                    );
                }
            }
        }

        if sent == 0 {
            return Ok(0);
        }

        self.cooldowns.record_dispatch(
            severity,
            now,
            std::time::Duration::from_secs(self.cooldown().num_seconds().max(0) as u64),
        );

        // Cooldown and audit are written as a pair once anything went out.
        self.audit
            .append_audit_record(build_audit_record(
                &thresholds,
                severity,
                window_hours,
                from_utc,
                now,
                &breaches,
                recipients.len(),
                sent,
            ))
            .await?;

        tracing::info!(
            severity = %severity,
            breaches = breaches.len(),
            sent,
            "Operational no-show alert dispatched"
        );

        Ok(sent)
    }

    async fn collect_metrics(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        token: &CancellationToken,
    ) -> ServiceResult<MetricValues> {
        let filters = KpiFilters {
            cancellation_no_show_window_hours: self.settings.cancellation_no_show_window_hours,
            ..KpiFilters::default()
        };

        token.check()?;
        let kpis = self.kpis.get_kpis(from_utc, to_utc, &filters).await?;

        let sent = self
            .count_outcome(ReminderDispatchStatus::Sent, from_utc, to_utc, token)
            .await?;
        let failed_permanent = self
            .count_outcome(ReminderDispatchStatus::FailedPermanent, from_utc, to_utc, token)
            .await?;
        let failed_retryable = self
            .count_outcome(ReminderDispatchStatus::FailedRetryable, from_utc, to_utc, token)
            .await?;

        Ok(MetricValues {
            no_show_rate_percent: percentage(kpis.no_show_count, kpis.base_count),
            high_risk_queue_count: kpis.high_risk_queue_count,
            reminder_send_success_rate_percent: reminder_success_rate(
                sent,
                failed_permanent,
                failed_retryable,
            ),
        })
    }

    async fn count_outcome(
        &self,
        status: ReminderDispatchStatus,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        token: &CancellationToken,
    ) -> ServiceResult<i64> {
        token.check()?;
        Ok(self.reminders.count_outcomes(status, from_utc, to_utc).await?)
    }

    fn cooldown(&self) -> Duration {
        Duration::minutes(self.settings.cooldown_minutes)
    }

    fn in_cooldown(&self, severity: Severity, now: DateTime<Utc>) -> bool {
        match self.cooldowns.last_dispatch(severity) {
            Some(last) => now - last < self.cooldown(),
            None => false,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_audit_record(
    thresholds: &AlertThresholdConfig,
    severity: Severity,
    window_hours: i64,
    from_utc: DateTime<Utc>,
    to_utc: DateTime<Utc>,
    breaches: &[Breach],
    recipients: usize,
    sent: usize,
) -> AuditRecord {
    let breach_details: Vec<serde_json::Value> = breaches
        .iter()
        .map(|breach| {
            json!({
                "metric": breach.metric.name(),
                "severity": breach.severity.as_str(),
                "current_value": breach.current_value,
                "warning_threshold": breach.warning_threshold,
                "critical_threshold": breach.critical_threshold,
            })
        })
        .collect();

    AuditRecord {
        id: Uuid::new_v4(),
        actor_user_id: Uuid::nil(),
        actor_email: SYSTEM_ACTOR_EMAIL.to_string(),
        action: AUDIT_ACTION.to_string(),
        target_type: AUDIT_TARGET_TYPE.to_string(),
        target_id: thresholds.id,
        metadata: json!({
            "severity": severity.as_str(),
            "period_from_utc": from_utc.to_rfc3339(),
            "period_to_utc": to_utc.to_rfc3339(),
            "evaluation_window_hours": window_hours,
            "breaches": breach_details,
            "recipients": recipients,
            "successful_dispatches": sent,
        }),
        created_at: to_utc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn thresholds() -> AlertThresholdConfig {
        AlertThresholdConfig {
            id: Uuid::new_v4(),
            name: "default".to_string(),
            is_active: true,
            no_show_rate_warning_percent: 70.0,
            no_show_rate_critical_percent: 90.0,
            high_risk_queue_warning_count: 10,
            high_risk_queue_critical_count: 25,
            reminder_send_success_warning_percent: 95.0,
            reminder_send_success_critical_percent: 85.0,
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn values(no_show: f64, queue: i64, reminders: f64) -> MetricValues {
        MetricValues {
            no_show_rate_percent: no_show,
            high_risk_queue_count: queue,
            reminder_send_success_rate_percent: reminders,
        }
    }

    fn admin(active: bool) -> UserSummary {
        UserSummary {
            id: Uuid::new_v4(),
            role: UserRole::Admin,
            is_active: active,
        }
    }

    #[test]
    fn test_no_breaches_when_healthy() {
        assert!(detect_breaches(&values(50.0, 3, 99.0), &thresholds()).is_empty());
    }

    #[test]
    fn test_breaches_are_ordered() {
        let breaches = detect_breaches(&values(75.0, 30, 80.0), &thresholds());
        let summary: Vec<(Metric, Severity)> =
            breaches.iter().map(|b| (b.metric, b.severity)).collect();

        assert_eq!(
            summary,
            vec![
                (Metric::HighRiskQueueCount, Severity::Critical),
                (Metric::ReminderSendSuccessRatePercent, Severity::Critical),
                (Metric::NoShowRatePercent, Severity::Warning),
            ]
        );
    }

    #[test]
    fn test_resolve_recipients_filters_admins() {
        let active = admin(true);
        let inactive = admin(false);
        let provider = UserSummary {
            id: Uuid::new_v4(),
            role: UserRole::Provider,
            is_active: true,
        };

        let recipients = resolve_recipients(&[active.clone(), inactive, provider], &[]);
        assert_eq!(recipients, vec![recipient_id(active.id)]);
    }

    #[test]
    fn test_resolve_recipients_merges_configured() {
        let active = admin(true);
        let configured = vec![
            active.id.hyphenated().to_string().to_uppercase(),
            "  Ops-Oncall@Example.com ".to_string(),
            "ops-oncall@example.com".to_string(),
            "   ".to_string(),
        ];

        let recipients = resolve_recipients(&[active.clone()], &configured);
        assert_eq!(
            recipients,
            vec![
                recipient_id(active.id),
                "ops-oncall@example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_resolve_recipients_empty() {
        assert!(resolve_recipients(&[admin(false)], &[" ".to_string()]).is_empty());
    }

    #[test]
    fn test_alert_message() {
        let to = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let from = to - Duration::hours(24);
        let v = values(75.04, 30, 80.0);
        let breaches = detect_breaches(&v, &thresholds());

        let (subject, body) =
            build_alert_message(Severity::Critical, 24, from, to, &v, &breaches);

        assert_eq!(subject, "CRITICAL no-show alert in operations");
        assert!(body.starts_with("Window: last 24h (09/03 12:00 - 10/03 12:00 UTC)"));
        assert!(body.contains("No-show rate: 75.0%"));
        assert!(body.contains(
            "- High-risk queue (count) [CRITICAL]: current 30 | warning 10 | critical 25"
        ));
        assert!(body.contains(
            "- No-show rate (%) [WARNING]: current 75.0 | warning 70.0 | critical 90.0"
        ));

        let (subject, _) = build_alert_message(Severity::Warning, 24, from, to, &v, &[]);
        assert_eq!(subject, "No-show alert in operations");
    }

    #[test]
    fn test_audit_record_payload() {
        let t = thresholds();
        let to = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let breaches = detect_breaches(&values(95.0, 0, 100.0), &t);

        let record = build_audit_record(
            &t,
            Severity::Critical,
            24,
            to - Duration::hours(24),
            to,
            &breaches,
            3,
            2,
        );

        assert_eq!(record.actor_user_id, Uuid::nil());
        assert_eq!(record.actor_email, "system@internal");
        assert_eq!(record.action, "NoShowOperationalAlertDispatched");
        assert_eq!(record.target_id, t.id);
        assert_eq!(record.metadata["severity"], "critical");
        assert_eq!(record.metadata["successful_dispatches"], 2);
        assert_eq!(record.metadata["breaches"][0]["metric"], "NoShowRatePercent");
    }
}
