//! No-show risk scoring for upcoming service appointments
//!
//! Each run scores a bounded batch of candidate appointments against the active
//! weighted policy, overwrites the stored risk state, appends a history entry
//! when anything changed and warns both parties when the level escalates.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::clock::Clock;
use crate::config::RiskScoringSettings;
use crate::error::ServiceResult;
use crate::models::{
    recipient_id, ActorRole, Appointment, AppointmentRiskState, RiskHistoryEntry, RiskLevel,
    RiskPolicy, RiskSnapshot,
};
use crate::notifications::Notifier;
use crate::repositories::{AppointmentStore, PolicyStore};

// ============================================================================
// Reason Codes
// ============================================================================

pub const REASON_CLIENT_NOT_CONFIRMED: &str = "client_presence_not_confirmed";
pub const REASON_PROVIDER_NOT_CONFIRMED: &str = "provider_presence_not_confirmed";
pub const REASON_BOTH_NOT_CONFIRMED: &str = "both_presence_not_confirmed";
pub const REASON_WINDOW_WITHIN_24H: &str = "window_within_24h";
pub const REASON_WINDOW_WITHIN_6H: &str = "window_within_6h";
pub const REASON_WINDOW_WITHIN_2H: &str = "window_within_2h";
pub const REASON_CLIENT_HISTORY_RISK: &str = "client_history_risk";
pub const REASON_PROVIDER_HISTORY_RISK: &str = "provider_history_risk";

const MIN_SCORE: i32 = 0;
const MAX_SCORE: i32 = 100;

/// Human-readable label for a reason code, used in notification bodies
pub fn reason_label(code: &str) -> &str {
    match code {
        REASON_CLIENT_NOT_CONFIRMED => "client has not confirmed attendance yet",
        REASON_PROVIDER_NOT_CONFIRMED => "provider has not confirmed attendance yet",
        REASON_BOTH_NOT_CONFIRMED => "neither party has confirmed attendance",
        REASON_WINDOW_WITHIN_24H => "visit starts within 24h",
        REASON_WINDOW_WITHIN_6H => "visit starts within 6h",
        REASON_WINDOW_WITHIN_2H => "visit starts within 2h",
        REASON_CLIENT_HISTORY_RISK => "recent cancellation history from the client",
        REASON_PROVIDER_HISTORY_RISK => "recent cancellation/expiry history from the provider",
        other => other,
    }
}

// ============================================================================
// Pure Assessment
// ============================================================================

/// Result of scoring one appointment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    /// Clamped to [0, 100]
    pub score: i32,
    pub level: RiskLevel,
    /// Distinct reason codes in encounter order
    pub reasons: Vec<&'static str>,
}

impl RiskAssessment {
    pub fn reasons_csv(&self) -> String {
        self.reasons.join(",")
    }

    pub fn to_state(&self, calculated_at_utc: DateTime<Utc>) -> AppointmentRiskState {
        AppointmentRiskState {
            score: self.score,
            level: self.level,
            reasons: self.reasons_csv(),
            calculated_at_utc,
        }
    }
}

/// Risk-flagging event counts for both parties over the policy lookback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorHistory {
    pub client_risk_events: i64,
    pub provider_risk_events: i64,
}

#[derive(Default)]
struct ScoreBuilder {
    score: i32,
    reasons: Vec<&'static str>,
}

impl ScoreBuilder {
    fn add(&mut self, weight: i32, reason: &'static str) {
        self.score = self.score.saturating_add(weight);
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// Time-to-window bucket. At most one applies: 2h, then 6h, then 24h. A window
/// that already started or lies beyond 24h gets none.
fn window_bucket(
    policy: &RiskPolicy,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<(i32, &'static str)> {
    let until_window = window_start - now;
    if until_window <= Duration::zero() {
        return None;
    }

    if until_window <= Duration::hours(2) {
        Some((policy.weight_window_within_2_hours, REASON_WINDOW_WITHIN_2H))
    } else if until_window <= Duration::hours(6) {
        Some((policy.weight_window_within_6_hours, REASON_WINDOW_WITHIN_6H))
    } else if until_window <= Duration::hours(24) {
        Some((policy.weight_window_within_24_hours, REASON_WINDOW_WITHIN_24H))
    } else {
        None
    }
}

/// Score one appointment. Deterministic for a given input.
pub fn assess(
    appointment: &Appointment,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
    history: ActorHistory,
) -> RiskAssessment {
    let mut builder = ScoreBuilder::default();

    let client_confirmed = appointment.client_confirmed();
    let provider_confirmed = appointment.provider_confirmed();

    if !client_confirmed {
        builder.add(policy.weight_client_not_confirmed, REASON_CLIENT_NOT_CONFIRMED);
    }
    if !provider_confirmed {
        builder.add(policy.weight_provider_not_confirmed, REASON_PROVIDER_NOT_CONFIRMED);
    }
    if !client_confirmed && !provider_confirmed {
        builder.add(policy.weight_both_not_confirmed_bonus, REASON_BOTH_NOT_CONFIRMED);
    }

    if let Some((weight, reason)) = window_bucket(policy, appointment.window_start_utc, now) {
        builder.add(weight, reason);
    }

    if history.client_risk_events >= i64::from(policy.min_client_history_risk_events) {
        builder.add(policy.weight_client_history_risk, REASON_CLIENT_HISTORY_RISK);
    }
    if history.provider_risk_events >= i64::from(policy.min_provider_history_risk_events) {
        builder.add(policy.weight_provider_history_risk, REASON_PROVIDER_HISTORY_RISK);
    }

    let score = builder.score.clamp(MIN_SCORE, MAX_SCORE);
    let level = RiskLevel::from_score(
        score,
        policy.medium_threshold_score,
        policy.high_threshold_score,
    );

    RiskAssessment {
        score,
        level,
        reasons: builder.reasons,
    }
}

/// Per-run memo of actor history counts, discarded after the run
#[derive(Debug, Default)]
struct HistoryMemo {
    clients: HashMap<Uuid, i64>,
    providers: HashMap<Uuid, i64>,
}

// ============================================================================
// Risk Scorer Service
// ============================================================================

/// Batch risk scorer
pub struct RiskScorer {
    policies: Arc<dyn PolicyStore>,
    appointments: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: RiskScoringSettings,
}

impl RiskScorer {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        appointments: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: RiskScoringSettings,
    ) -> Self {
        Self {
            policies,
            appointments,
            notifier,
            clock,
            settings,
        }
    }

    /// Score up to `batch_size` candidates once. Returns how many were processed.
    ///
    /// A missing active policy is a no-op. A failed write aborts the run with
    /// the candidates before it already persisted.
    pub async fn evaluate_risk(
        &self,
        batch_size: usize,
        token: &CancellationToken,
    ) -> ServiceResult<usize> {
        token.check()?;
        let policy = match self.policies.get_active_policy().await? {
            Some(policy) => policy,
            None => {
                tracing::warn!("No-show risk evaluation skipped: no active policy");
                return Ok(0);
            }
        };

        if let Err(e) = policy.validate() {
            tracing::warn!(
                policy_id = %policy.id,
                error = %e,
                "Active no-show risk policy is outside admin ranges"
            );
        }

        let now = self.clock.now();
        let from_utc = now - Duration::minutes(self.settings.include_past_window_minutes);
        let to_utc = now + Duration::hours(self.settings.lookahead_hours);

        token.check()?;
        let mut candidates = self
            .appointments
            .get_risk_candidates(from_utc, to_utc, batch_size)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        // Deterministic order regardless of what the store returns.
        candidates.sort_by(|a, b| {
            a.window_start_utc
                .cmp(&b.window_start_utc)
                .then_with(|| a.id.cmp(&b.id))
        });

        let history_from = now - Duration::days(i64::from(policy.lookback_days));
        let mut memo = HistoryMemo::default();
        let mut processed = 0;

        for mut appointment in candidates {
            token.check()?;
            self.process_candidate(&mut appointment, &policy, now, history_from, &mut memo, token)
                .await?;
            processed += 1;
        }

        tracing::info!(processed, "No-show risk batch evaluated");
        Ok(processed)
    }

    async fn process_candidate(
        &self,
        appointment: &mut Appointment,
        policy: &RiskPolicy,
        now: DateTime<Utc>,
        history_from: DateTime<Utc>,
        memo: &mut HistoryMemo,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        let previous = appointment.risk_snapshot();

        let history = self
            .actor_history(appointment, policy, history_from, now, memo, token)
            .await?;
        let assessment = assess(appointment, policy, now, history);
        let state = assessment.to_state(now);

        token.check()?;
        self.appointments
            .save_risk_state(appointment.id, &state)
            .await?;
        appointment.apply_risk_state(&state);

        if !previous.differs_from(&state) {
            return Ok(());
        }

        token.check()?;
        self.appointments
            .append_history(build_history_entry(appointment, &previous, &state, now))
            .await?;

        tracing::debug!(
            appointment_id = %appointment.id,
            score = state.score,
            level = %state.level,
            "No-show risk changed"
        );

        if is_escalation(previous.level, state.level) {
            self.notify_escalation(appointment, &assessment).await;
        }

        Ok(())
    }

    async fn actor_history(
        &self,
        appointment: &Appointment,
        policy: &RiskPolicy,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        memo: &mut HistoryMemo,
        token: &CancellationToken,
    ) -> ServiceResult<ActorHistory> {
        let limit = i64::from(policy.max_history_events_per_actor);

        let client_risk_events = match memo.clients.get(&appointment.client_id) {
            Some(count) => *count,
            None => {
                token.check()?;
                let count = self
                    .appointments
                    .count_client_risk_events(appointment.client_id, from_utc, to_utc, limit)
                    .await?
                    .min(limit);
                memo.clients.insert(appointment.client_id, count);
                count
            }
        };

        let provider_risk_events = match memo.providers.get(&appointment.provider_id) {
            Some(count) => *count,
            None => {
                token.check()?;
                let count = self
                    .appointments
                    .count_provider_risk_events(appointment.provider_id, from_utc, to_utc, limit)
                    .await?
                    .min(limit);
                memo.providers.insert(appointment.provider_id, count);
                count
            }
        };

        Ok(ActorHistory {
            client_risk_events,
            provider_risk_events,
        })
    }

    /// Warn client and provider independently; failures are only logged.
    async fn notify_escalation(&self, appointment: &Appointment, assessment: &RiskAssessment) {
        let subject = escalation_subject(assessment.level);
        let body = escalation_body(appointment, assessment);
        let deep_link = format!(
            "/ServiceRequests/Details/{}?appointmentId={}",
            appointment.service_request_id, appointment.id
        );

        for recipient in [
            recipient_id(appointment.client_id),
            recipient_id(appointment.provider_id),
        ] {
            if let Err(e) = self
                .notifier
                .send(&recipient, &subject, &body, &deep_link)
                .await
            {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    recipient = %recipient,
                    error = %e,
                    "Failed to send preventive no-show risk notification"
                );
            }
        }
    }
}

/// Elevated level reached from a strictly lower (or no) previous level
fn is_escalation(previous: Option<RiskLevel>, current: RiskLevel) -> bool {
    current.is_elevated() && previous.map_or(true, |prev| current > prev)
}

fn escalation_subject(level: RiskLevel) -> String {
    let label = match level {
        RiskLevel::High => "high",
        _ => "medium",
    };
    format!("Preventive alert: {} no-show risk", label)
}

fn escalation_body(appointment: &Appointment, assessment: &RiskAssessment) -> String {
    let reasons: Vec<&str> = assessment.reasons.iter().map(|code| reason_label(code)).collect();
    let reasons_text = if reasons.is_empty() {
        "No detailed reasons.".to_string()
    } else {
        reasons.join("; ")
    };

    format!(
        "Appointment at {} with score {}/100. Reasons: {}",
        appointment.window_start_utc.format("%d/%m %H:%M"),
        assessment.score,
        reasons_text
    )
}

fn build_history_entry(
    appointment: &Appointment,
    previous: &RiskSnapshot,
    state: &AppointmentRiskState,
    now: DateTime<Utc>,
) -> RiskHistoryEntry {
    let metadata = json!({
        "type": "no_show_risk_assessment",
        "previous": {
            "score": previous.score,
            "level": previous.level.map(|level| level.as_str()),
            "reasons": previous.reasons,
        },
        "current": {
            "score": state.score,
            "level": state.level.as_str(),
            "reasons": state.reasons,
        },
    });

    RiskHistoryEntry {
        id: Uuid::new_v4(),
        appointment_id: appointment.id,
        previous_status: appointment.status,
        new_status: appointment.status,
        actor_role: ActorRole::System,
        reason: format!(
            "No-show risk recalculated: {} ({}).",
            state.level, state.score
        ),
        metadata,
        occurred_at_utc: now,
    }
}
