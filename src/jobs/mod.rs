//! Background job driving the scorer and the alert evaluator

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::config::WorkerSettings;
use crate::error::ServiceResult;
use crate::services::{AlertEvaluator, RiskScorer};

/// Counts produced by one worker pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub risk_evaluated: usize,
    pub alerts_sent: usize,
}

/// Periodic no-show risk worker
pub struct NoShowRiskWorker {
    scorer: Arc<RiskScorer>,
    alerts: Arc<AlertEvaluator>,
    settings: WorkerSettings,
}

impl NoShowRiskWorker {
    pub fn new(
        scorer: Arc<RiskScorer>,
        alerts: Arc<AlertEvaluator>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            scorer,
            alerts,
            settings,
        }
    }

    /// Score one batch, then evaluate operational alerts.
    pub async fn run_once(&self, token: &CancellationToken) -> ServiceResult<PassSummary> {
        let risk_evaluated = self
            .scorer
            .evaluate_risk(self.settings.batch_size, token)
            .await?;
        if risk_evaluated > 0 {
            tracing::info!(risk_evaluated, "No-show risk worker processed appointments");
        }

        let alerts_sent = self.alerts.evaluate_and_notify(token).await?;
        if alerts_sent > 0 {
            tracing::info!(alerts_sent, "No-show risk worker dispatched operational alerts");
        }

        Ok(PassSummary {
            risk_evaluated,
            alerts_sent,
        })
    }

    /// Tick until the token is cancelled. Failed passes are logged and retried
    /// on the next tick.
    pub async fn run(&self, token: CancellationToken) {
        if !self.settings.enabled {
            tracing::info!("No-show risk worker disabled");
            return;
        }

        tracing::info!(
            interval_seconds = self.settings.interval_seconds,
            batch_size = self.settings.batch_size,
            "Starting no-show risk worker"
        );

        let mut interval = tokio::time::interval(self.settings.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.run_once(&token).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        code = e.error_code(),
                        "No-show risk worker pass failed"
                    );
                }
            }
        }

        tracing::info!("No-show risk worker stopped");
    }
}
