//! PostgreSQL adapters for the collaborator traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AppointmentStore, AuditSink, KpiSource, PolicyStore, ReminderDispatchStore, UserDirectory,
};
use crate::error::StoreError;
use crate::models::{
    AlertThresholdConfig, Appointment, AppointmentRiskState, AuditRecord, KpiFilters, KpiSnapshot,
    ReminderDispatchStatus, RiskHistoryEntry, RiskPolicy, UserSummary,
};

/// Active policy and thresholds
#[derive(Clone)]
pub struct PgPolicyStore {
    db_pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn get_active_policy(&self) -> Result<Option<RiskPolicy>, StoreError> {
        let policy = sqlx::query_as::<_, RiskPolicy>(
            r#"
            SELECT *
            FROM no_show_risk_policies
            WHERE is_active = true
            ORDER BY COALESCE(updated_at, created_at) DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(policy)
    }

    async fn get_active_thresholds(&self) -> Result<Option<AlertThresholdConfig>, StoreError> {
        let thresholds = sqlx::query_as::<_, AlertThresholdConfig>(
            r#"
            SELECT *
            FROM no_show_alert_thresholds
            WHERE is_active = true
            ORDER BY COALESCE(updated_at, created_at) DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(thresholds)
    }
}

/// Service appointments and their history
#[derive(Clone)]
pub struct PgAppointmentStore {
    db_pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn get_risk_candidates(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT
                id, service_request_id, client_id, provider_id, status,
                window_start_utc, window_end_utc,
                client_presence_confirmed, provider_presence_confirmed,
                no_show_risk_score, no_show_risk_level, no_show_risk_reasons,
                no_show_risk_calculated_at_utc
            FROM service_appointments
            WHERE window_start_utc >= $1
              AND window_start_utc <= $2
              AND status IN ('pending_provider_confirmation', 'confirmed', 'reschedule_requested')
            ORDER BY window_start_utc ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(from_utc)
        .bind(to_utc)
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(appointments)
    }

    async fn count_client_risk_events(
        &self,
        client_id: Uuid,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
            FROM (
                SELECT 1
                FROM service_appointments
                WHERE client_id = $1
                  AND status = 'cancelled_by_client'
                  AND updated_at >= $2
                  AND updated_at <= $3
                ORDER BY updated_at DESC
                LIMIT $4
            ) AS events
            "#,
        )
        .bind(client_id)
        .bind(from_utc)
        .bind(to_utc)
        .bind(limit)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn count_provider_risk_events(
        &self,
        provider_id: Uuid,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        limit: i64,
    ) -> Result<i64, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
            FROM (
                SELECT 1
                FROM service_appointments
                WHERE provider_id = $1
                  AND status IN (
                      'cancelled_by_provider',
                      'rejected_by_provider',
                      'expired_without_provider_action'
                  )
                  AND updated_at >= $2
                  AND updated_at <= $3
                ORDER BY updated_at DESC
                LIMIT $4
            ) AS events
            "#,
        )
        .bind(provider_id)
        .bind(from_utc)
        .bind(to_utc)
        .bind(limit)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn save_risk_state(
        &self,
        appointment_id: Uuid,
        state: &AppointmentRiskState,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE service_appointments
            SET no_show_risk_score = $1,
                no_show_risk_level = $2,
                no_show_risk_reasons = $3,
                no_show_risk_calculated_at_utc = $4,
                updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(state.score)
        .bind(state.level)
        .bind(&state.reasons)
        .bind(state.calculated_at_utc)
        .bind(appointment_id)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "service appointment {}",
                appointment_id
            )));
        }

        Ok(())
    }

    async fn append_history(&self, entry: RiskHistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO service_appointment_histories (
                id, service_appointment_id, previous_status, new_status,
                actor_role, reason, metadata, occurred_at_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, CAST($7 AS jsonb), $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.appointment_id)
        .bind(entry.previous_status)
        .bind(entry.new_status)
        .bind(entry.actor_role)
        .bind(&entry.reason)
        .bind(entry.metadata.to_string())
        .bind(entry.occurred_at_utc)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

/// Dashboard KPI rollup
#[derive(Clone)]
pub struct PgKpiSource {
    db_pool: PgPool,
}

impl PgKpiSource {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl KpiSource for PgKpiSource {
    async fn get_kpis(
        &self,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
        filters: &KpiFilters,
    ) -> Result<KpiSnapshot, StoreError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            r#"
            SELECT
                COUNT(*) FILTER (
                    WHERE a.status = 'expired_without_provider_action'
                       OR (a.status IN ('cancelled_by_client', 'cancelled_by_provider')
                           AND a.updated_at >= a.window_start_utc - make_interval(hours => "#,
        );
        query_builder.push_bind(filters.cancellation_no_show_window_hours as i32);
        query_builder.push(
            r#"))
                ) AS no_show_count,
                COUNT(*) AS base_count
            FROM service_appointments a
            JOIN service_requests r ON r.id = a.service_request_id
            WHERE a.window_start_utc >= "#,
        );
        query_builder.push_bind(from_utc);
        query_builder.push(" AND a.window_start_utc <= ");
        query_builder.push_bind(to_utc);

        if let Some(city) = &filters.city {
            query_builder.push(" AND r.city = ");
            query_builder.push_bind(city.clone());
        }
        if let Some(category) = &filters.category {
            query_builder.push(" AND r.category = ");
            query_builder.push_bind(category.clone());
        }
        if let Some(risk_level) = filters.risk_level {
            query_builder.push(" AND a.no_show_risk_level = ");
            query_builder.push_bind(risk_level);
        }

        let (no_show_count, base_count) = query_builder
            .build_query_as::<(Option<i64>, Option<i64>)>()
            .fetch_one(&self.db_pool)
            .await?;

        let (high_risk_queue_count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
            FROM service_appointment_no_show_queue_items
            WHERE status = 'open' AND risk_level = 'high'
            "#,
        )
        .fetch_one(&self.db_pool)
        .await?;

        Ok(KpiSnapshot {
            no_show_count: no_show_count.unwrap_or(0),
            base_count: base_count.unwrap_or(0),
            high_risk_queue_count,
        })
    }
}

/// Appointment reminder dispatch log
#[derive(Clone)]
pub struct PgReminderDispatchStore {
    db_pool: PgPool,
}

impl PgReminderDispatchStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ReminderDispatchStore for PgReminderDispatchStore {
    async fn count_outcomes(
        &self,
        status: ReminderDispatchStatus,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
            FROM appointment_reminder_dispatches
            WHERE status = $1
              AND updated_at >= $2
              AND updated_at <= $3
            "#,
        )
        .bind(status)
        .bind(from_utc)
        .bind(to_utc)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }
}

/// Admin roster
#[derive(Clone)]
pub struct PgUserDirectory {
    db_pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT id, role, is_active FROM users WHERE role = 'admin' ORDER BY id",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(users)
    }
}

/// Admin audit log
#[derive(Clone)]
pub struct PgAuditSink {
    db_pool: PgPool,
}

impl PgAuditSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append_audit_record(&self, record: AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_logs (
                id, actor_user_id, actor_email, action, target_type, target_id,
                metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, CAST($7 AS jsonb), $8)
            "#,
        )
        .bind(record.id)
        .bind(record.actor_user_id)
        .bind(&record.actor_email)
        .bind(&record.action)
        .bind(&record.target_type)
        .bind(record.target_id)
        .bind(record.metadata.to_string())
        .bind(record.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}
