//! Background worker tests

mod common;

use chrono::Duration;
use std::sync::Arc;

use common::{appointment, Harness};
use noshow_guard::cancellation::CancellationToken;
use noshow_guard::config::{AlertSettings, WorkerSettings};
use noshow_guard::jobs::{NoShowRiskWorker, PassSummary};

fn worker(h: &Harness, settings: WorkerSettings) -> NoShowRiskWorker {
    NoShowRiskWorker::new(
        Arc::new(h.scorer()),
        Arc::new(h.evaluator(AlertSettings::default())),
        settings,
    )
}

#[tokio::test]
async fn test_run_once_scores_then_alerts() {
    let h = Harness::new();
    h.appointments.insert(appointment(Duration::hours(1)));
    h.appointments.insert(appointment(Duration::hours(2)));
    h.users.add_admin(true);
    h.set_no_show_rate(95);

    let summary = worker(&h, WorkerSettings::default())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        summary,
        PassSummary {
            risk_evaluated: 2,
            alerts_sent: 1,
        }
    );
}

#[tokio::test]
async fn test_disabled_worker_returns_without_ticking() {
    let h = Harness::new();
    h.appointments.insert(appointment(Duration::hours(1)));

    worker(
        &h,
        WorkerSettings {
            enabled: false,
            ..WorkerSettings::default()
        },
    )
    .run(CancellationToken::new())
    .await;

    assert!(h.appointments.saved.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_cancellation() {
    let h = Harness::new();
    h.appointments.insert(appointment(Duration::hours(1)));
    let worker = worker(&h, WorkerSettings::default());
    let token = CancellationToken::new();

    let stopper = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(90)).await;
        stopper.cancel();
    });

    worker.run(token).await;

    // Ticks at 0s and 60s ran before the token fired at 90s.
    assert_eq!(h.appointments.saved.lock().unwrap().len(), 2);
}
