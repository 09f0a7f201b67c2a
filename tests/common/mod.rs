//! In-memory collaborators for the service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use noshow_guard::cancellation::CancellationToken;
use noshow_guard::clock::Clock;
use noshow_guard::config::{AlertSettings, RiskScoringSettings};
use noshow_guard::error::{DeliveryError, StoreError};
use noshow_guard::models::{
    AlertThresholdConfig, Appointment, AppointmentRiskState, AppointmentStatus, AuditRecord,
    KpiFilters, KpiSnapshot, ReminderDispatchStatus, RiskHistoryEntry, RiskPolicy, UserRole,
    UserSummary,
};
use noshow_guard::notifications::{Notification, Notifier};
use noshow_guard::repositories::{
    AppointmentStore, AuditSink, KpiSource, PolicyStore, ReminderDispatchStore, UserDirectory,
};
use noshow_guard::services::{AlertEvaluator, MokaCooldownStore, RiskScorer};

// ============================================================================
// Clock
// ============================================================================

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Policy Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryPolicyStore {
    pub policy: Mutex<Option<RiskPolicy>>,
    pub thresholds: Mutex<Option<AlertThresholdConfig>>,
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_active_policy(&self) -> Result<Option<RiskPolicy>, StoreError> {
        Ok(self.policy.lock().unwrap().clone())
    }

    async fn get_active_thresholds(&self) -> Result<Option<AlertThresholdConfig>, StoreError> {
        Ok(self.thresholds.lock().unwrap().clone())
    }
}

pub fn policy() -> RiskPolicy {
    RiskPolicy {
        id: Uuid::new_v4(),
        name: "default".to_string(),
        is_active: true,
        lookback_days: 90,
        max_history_events_per_actor: 20,
        min_client_history_risk_events: 2,
        min_provider_history_risk_events: 2,
        weight_client_not_confirmed: 20,
        weight_provider_not_confirmed: 20,
        weight_both_not_confirmed_bonus: 10,
        weight_window_within_24_hours: 10,
        weight_window_within_6_hours: 15,
        weight_window_within_2_hours: 25,
        weight_client_history_risk: 15,
        weight_provider_history_risk: 15,
        low_threshold_score: 0,
        medium_threshold_score: 40,
        high_threshold_score: 80,
        notes: None,
        created_at: start_time(),
        updated_at: None,
    }
}

pub fn thresholds() -> AlertThresholdConfig {
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
        created_at: start_time(),
        updated_at: None,
    }
}

// ============================================================================
// Appointment Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    pub appointments: Mutex<Vec<Appointment>>,
    pub client_events: Mutex<HashMap<Uuid, i64>>,
    pub provider_events: Mutex<HashMap<Uuid, i64>>,
    pub client_lookups: Mutex<Vec<Uuid>>,
    pub provider_lookups: Mutex<Vec<Uuid>>,
    pub saved: Mutex<Vec<(Uuid, AppointmentRiskState)>>,
    pub history: Mutex<Vec<RiskHistoryEntry>>,
    pub fail_save_for: Mutex<Option<Uuid>>,
}

impl InMemoryAppointmentStore {
    pub fn insert(&self, appointment: Appointment) {
        self.appointments.lock().unwrap().push(appointment);
    }

    pub fn get(&self, id: Uuid) -> Appointment {
        self.appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .unwrap()
    }

    pub fn update(&self, id: Uuid, change: impl FnOnce(&mut Appointment)) {
        let mut appointments = self.appointments.lock().unwrap();
        let appointment = appointments.iter_mut().find(|a| a.id == id).unwrap();
        change(appointment);
    }

    pub fn history_count(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get_risk_candidates(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError> {
        // Reverse insertion order so the scorer has to impose its own ordering.
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|a| a.window_start_utc >= from_utc && a.window_start_utc <= to_utc)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_client_risk_events(
        &self,
        client_id: Uuid,
        _from_utc: DateTime<Utc>,
        _to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError> {
        self.client_lookups.lock().unwrap().push(client_id);
        let count = self
            .client_events
            .lock()
            .unwrap()
            .get(&client_id)
            .copied()
            .unwrap_or(0);
        Ok(count.min(limit))
    }

    async fn count_provider_risk_events(
        &self,
        provider_id: Uuid,
        _from_utc: DateTime<Utc>,
        _to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError> {
        self.provider_lookups.lock().unwrap().push(provider_id);
        let count = self
            .provider_events
            .lock()
            .unwrap()
            .get(&provider_id)
            .copied()
            .unwrap_or(0);
        Ok(count.min(limit))
    }

    async fn save_risk_state(
        &self,
        appointment_id: Uuid,
        state: &AppointmentRiskState,
    ) -> Result<(), StoreError> {
        if *self.fail_save_for.lock().unwrap() == Some(appointment_id) {
            return Err(StoreError::Database("write rejected".to_string()));
        }

        let mut appointments = self.appointments.lock().unwrap();
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| StoreError::NotFound(appointment_id.to_string()))?;
        appointment.apply_risk_state(state);

        self.saved
            .lock()
            .unwrap()
            .push((appointment_id, state.clone()));
        Ok(())
    }

    async fn append_history(&self, entry: RiskHistoryEntry) -> Result<(), StoreError> {
        self.history.lock().unwrap().push(entry);
        Ok(())
    }
}

pub fn appointment(starts_in: Duration) -> Appointment {
    let start = start_time() + starts_in;
    Appointment {
        id: Uuid::new_v4(),
        service_request_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        status: AppointmentStatus::Confirmed,
        window_start_utc: start,
        window_end_utc: start + Duration::hours(1),
        client_presence_confirmed: None,
        provider_presence_confirmed: None,
        no_show_risk_score: None,
        no_show_risk_level: None,
        no_show_risk_reasons: None,
        no_show_risk_calculated_at_utc: None,
    }
}

// ============================================================================
// KPI, Reminders, Users, Audit
// ============================================================================

#[derive(Default)]
pub struct FakeKpiSource {
    pub snapshot: Mutex<KpiSnapshot>,
    pub requests: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>, i64)>>,
}

#[async_trait]
impl KpiSource for FakeKpiSource {
    async fn get_kpis(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        filters: &KpiFilters,
    ) -> Result<KpiSnapshot, StoreError> {
        self.requests.lock().unwrap().push((
            from_utc,
            to_utc,
            filters.cancellation_no_show_window_hours,
        ));
        Ok(*self.snapshot.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeReminderStore {
    pub sent: Mutex<i64>,
    pub failed_permanent: Mutex<i64>,
    pub failed_retryable: Mutex<i64>,
}

#[async_trait]
impl ReminderDispatchStore for FakeReminderStore {
    async fn count_outcomes(
        &self,
        status: ReminderDispatchStatus,
        _from_utc: DateTime<Utc>,
        _to_utc: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = match status {
            ReminderDispatchStatus::Sent => *self.sent.lock().unwrap(),
            ReminderDispatchStatus::FailedPermanent => *self.failed_permanent.lock().unwrap(),
            ReminderDispatchStatus::FailedRetryable => *self.failed_retryable.lock().unwrap(),
            _ => 0,
        };
        Ok(count)
    }
}

#[derive(Default)]
pub struct FakeUserDirectory {
    pub users: Mutex<Vec<UserSummary>>,
}

impl FakeUserDirectory {
    pub fn add_admin(&self, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().push(UserSummary {
            id,
            role: UserRole::Admin,
            is_active,
        });
        id
    }
}

#[async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self.users.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    pub records: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append_audit_record(&self, record: AuditRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Records deliveries; recipients in `failing` get a transport error and
/// `cancel_after` cancels a token once that many sends were attempted.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<Notification>>,
    pub failing: Mutex<HashSet<String>>,
    pub attempts: Mutex<usize>,
    pub cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        deep_link: &str,
    ) -> Result<(), DeliveryError> {
        let attempts = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if attempts >= *after {
                token.cancel();
            }
        }

        if self.failing.lock().unwrap().contains(recipient) {
            return Err(DeliveryError::Transport("connection reset".to_string()));
        }

        self.delivered.lock().unwrap().push(Notification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            deep_link: deep_link.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub policies: Arc<InMemoryPolicyStore>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub kpis: Arc<FakeKpiSource>,
    pub reminders: Arc<FakeReminderStore>,
    pub users: Arc<FakeUserDirectory>,
    pub audit: Arc<RecordingAuditSink>,
    pub notifier: Arc<RecordingNotifier>,
    pub cooldowns: Arc<MokaCooldownStore>,
}

impl Harness {
    pub fn new() -> Self {
        let policies = InMemoryPolicyStore::default();
        *policies.policy.lock().unwrap() = Some(policy());
        *policies.thresholds.lock().unwrap() = Some(thresholds());

        Self {
            clock: Arc::new(ManualClock::new(start_time())),
            policies: Arc::new(policies),
            appointments: Arc::new(InMemoryAppointmentStore::default()),
            kpis: Arc::new(FakeKpiSource::default()),
            reminders: Arc::new(FakeReminderStore::default()),
            users: Arc::new(FakeUserDirectory::default()),
            audit: Arc::new(RecordingAuditSink::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            cooldowns: Arc::new(MokaCooldownStore::new()),
        }
    }

    pub fn scorer(&self) -> RiskScorer {
        RiskScorer::new(
            self.policies.clone(),
            self.appointments.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            RiskScoringSettings::default(),
        )
    }

    pub fn evaluator(&self, settings: AlertSettings) -> AlertEvaluator {
        AlertEvaluator::new(
            self.policies.clone(),
            self.kpis.clone(),
            self.reminders.clone(),
            self.users.clone(),
            self.notifier.clone(),
            self.audit.clone(),
            self.cooldowns.clone(),
            self.clock.clone(),
            settings,
        )
    }

    /// KPIs breaching the no-show rate at the given percentage of 100 appointments
    pub fn set_no_show_rate(&self, no_show_count: i64) {
        *self.kpis.snapshot.lock().unwrap() = KpiSnapshot {
            no_show_count,
            base_count: 100,
            high_risk_queue_count: 0,
        };
    }

    pub fn audit_count(&self) -> usize {
        self.audit.records.lock().unwrap().len()
    }
}
