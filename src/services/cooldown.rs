//! Per-severity alert cooldown cache
//!
//! Entries live in process memory and disappear on restart; losing one only
//! risks a single duplicate alert.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use super::breach::Severity;

/// Expiring store of the last dispatch instant per severity tier.
///
/// Reads and writes are independent operations: two racing evaluators may both
/// pass the check and the later writer wins.
pub trait CooldownStore: Send + Sync {
    fn last_dispatch(&self, tier: Severity) -> Option<DateTime<Utc>>;

    fn record_dispatch(&self, tier: Severity, dispatched_at: DateTime<Utc>, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CooldownEntry {
    dispatched_at: DateTime<Utc>,
    ttl: Duration,
}

/// Each entry expires after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<&'static str, CooldownEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &&'static str,
        value: &CooldownEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &&'static str,
        value: &CooldownEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// moka-backed cooldown cache
#[derive(Clone)]
pub struct MokaCooldownStore {
    cache: Cache<&'static str, CooldownEntry>,
}

impl MokaCooldownStore {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }
}

impl Default for MokaCooldownStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownStore for MokaCooldownStore {
    fn last_dispatch(&self, tier: Severity) -> Option<DateTime<Utc>> {
        self.cache.get(tier.as_str()).map(|entry| entry.dispatched_at)
    }

    fn record_dispatch(&self, tier: Severity, dispatched_at: DateTime<Utc>, ttl: Duration) {
        self.cache
            .insert(tier.as_str(), CooldownEntry { dispatched_at, ttl });
    }
}
