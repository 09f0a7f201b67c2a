//! No-show guard worker
//!
//! Runs the no-show risk scorer and the operational alert evaluator on a
//! fixed interval against the marketplace database.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use noshow_guard::cancellation::CancellationToken;
use noshow_guard::clock::SystemClock;
use noshow_guard::config::Config;
use noshow_guard::db;
use noshow_guard::jobs::NoShowRiskWorker;
use noshow_guard::notifications::BroadcastNotifier;
use noshow_guard::repositories::{
    PgAppointmentStore, PgAuditSink, PgKpiSource, PgPolicyStore, PgReminderDispatchStore,
    PgUserDirectory,
};
use noshow_guard::services::{AlertEvaluator, MokaCooldownStore, RiskScorer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Initialize database connection pool
    let db_pool = db::create_pool(&config).await?;
    db::check_health(&db_pool).await?;

    let policies = Arc::new(PgPolicyStore::new(db_pool.clone()));
    let clock = Arc::new(SystemClock);

    // Preventive and operational notifications share one in-process channel
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            tracing::info!(
                recipient = %notification.recipient,
                subject = %notification.subject,
                deep_link = %notification.deep_link,
                "Notification published"
            );
        }
    });

    let scorer = Arc::new(RiskScorer::new(
        policies.clone(),
        Arc::new(PgAppointmentStore::new(db_pool.clone())),
        notifier.clone(),
        clock.clone(),
        config.scoring.clone(),
    ));

    let alerts = Arc::new(AlertEvaluator::new(
        policies,
        Arc::new(PgKpiSource::new(db_pool.clone())),
        Arc::new(PgReminderDispatchStore::new(db_pool.clone())),
        Arc::new(PgUserDirectory::new(db_pool.clone())),
        notifier,
        Arc::new(PgAuditSink::new(db_pool.clone())),
        Arc::new(MokaCooldownStore::new()),
        clock,
        config.alerts.clone(),
    ));

    let token = CancellationToken::new();
    let worker = NoShowRiskWorker::new(scorer, alerts, config.worker.clone());

    // Start worker in background
    let worker_token = token.clone();
    let worker_task = tokio::spawn(async move {
        tracing::info!("No-show risk worker task started");
        worker.run(worker_token).await;
    });

    shutdown_signal().await;
    token.cancel();

    worker_task.await.context("No-show risk worker task panicked")?;
    db_pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
