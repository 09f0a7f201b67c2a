//! Business logic services for the no-show guard

pub mod alert_evaluator;
pub mod breach;
pub mod cooldown;
pub mod risk_scorer;

pub use alert_evaluator::AlertEvaluator;
pub use breach::{Breach, Metric, Polarity, Severity};
pub use cooldown::{CooldownStore, MokaCooldownStore};
pub use risk_scorer::{RiskAssessment, RiskScorer};
