//! Time source for the batch jobs

use chrono::{DateTime, Utc};

/// Supplies the current instant. Production uses [`SystemClock`]; tests swap in
/// a controllable clock so cooldown windows and time-to-window buckets can be
/// exercised without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
