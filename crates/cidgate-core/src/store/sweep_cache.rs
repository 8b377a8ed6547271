// ── Sweep cache ──
//
// Short-lived memo of the last complete ranked list. Readers never block
// a writer: the slot is swapped atomically. The fetch path never reads
// from here; it always ranks from live health state.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RankedGateway;

/// One stored sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSweep {
    pub version: u32,
    pub stored_at: DateTime<Utc>,
    pub ranked: Vec<RankedGateway>,
}

impl CachedSweep {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
pub struct SweepCache {
    slot: ArcSwapOption<CachedSweep>,
    version: u32,
    ttl: Duration,
}

impl SweepCache {
    pub fn new(version: u32, ttl: Duration) -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            version,
            ttl,
        }
    }

    /// The cached sweep, if its version matches and it is younger than the TTL.
    pub fn get_if_fresh(&self) -> Option<Arc<CachedSweep>> {
        self.get_if_fresh_at(Utc::now())
    }

    pub fn get_if_fresh_at(&self, now: DateTime<Utc>) -> Option<Arc<CachedSweep>> {
        let cached = self.slot.load_full()?;
        if cached.version != self.version {
            return None;
        }
        (cached.age(now) < self.ttl).then_some(cached)
    }

    /// Replace the cached sweep, stamped with the current version.
    pub fn store(&self, ranked: Vec<RankedGateway>) -> Arc<CachedSweep> {
        let entry = Arc::new(CachedSweep {
            version: self.version,
            stored_at: Utc::now(),
            ranked,
        });
        self.slot.store(Some(Arc::clone(&entry)));
        entry
    }

    /// Install a previously persisted sweep as-is. Freshness is still
    /// judged on every read.
    pub fn restore(&self, entry: CachedSweep) {
        self.slot.store(Some(Arc::new(entry)));
    }

    /// The stored sweep regardless of freshness.
    pub fn current(&self) -> Option<Arc<CachedSweep>> {
        self.slot.load_full()
    }

    pub fn invalidate(&self) {
        self.slot.store(None);
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
