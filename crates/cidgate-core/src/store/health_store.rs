// ── Health store ──
//
// One `HealthRecord` per gateway id. Probes and real downloads write the
// same records concurrently, so every mutation goes through `upsert`,
// which holds the entry's shard lock for the whole read-modify-write.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::model::{GatewayId, HealthRecord, ProbeResult, Region};
use crate::scorer::Scorer;

/// Format version of the persisted health document.
pub const HEALTH_FORMAT_VERSION: u32 = 1;

/// Concurrent, TTL-bounded store of per-gateway health.
#[derive(Debug)]
pub struct HealthStore {
    records: DashMap<GatewayId, HealthRecord>,
    scorer: Scorer,
    ttl: Duration,
}

impl HealthStore {
    pub fn new(scorer: Scorer, ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            scorer,
            ttl,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn get(&self, id: &GatewayId) -> Option<HealthRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Fold one observation into the gateway's record and rescore it.
    ///
    /// A record older than the TTL is replaced by a fresh one before the
    /// observation is applied. Returns the updated record.
    pub fn upsert(&self, id: &GatewayId, region: Region, result: &ProbeResult) -> HealthRecord {
        let now = result.observed_at;
        let mut entry = self
            .records
            .entry(id.clone())
            .or_insert_with(|| HealthRecord::new(id.clone(), region, now));
        let record = entry.value_mut();

        if record.is_expired(self.ttl, now) {
            debug!(gateway = %id, "health record expired, starting a fresh baseline");
            *record = HealthRecord::new(id.clone(), region, now);
        }
        record.region = region;
        record.record(result);
        self.scorer.apply(record);

        trace!(
            gateway = %id,
            status = %record.status,
            score = record.score,
            streak = record.consecutive_failures,
            "health updated"
        );
        record.clone()
    }

    /// Drop every record older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, rec| !rec.is_expired(self.ttl, now));
        before.saturating_sub(self.records.len())
    }

    pub fn remove(&self, id: &GatewayId) -> Option<HealthRecord> {
        self.records.remove(id).map(|(_, rec)| rec)
    }

    /// All records, ordered by gateway id.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let mut all: Vec<HealthRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.gateway_id.cmp(&b.gateway_id));
        all
    }

    /// Load persisted records, skipping expired ones and rescoring the
    /// rest with the current weights.
    pub fn restore(&self, records: Vec<HealthRecord>) -> usize {
        let now = Utc::now();
        let mut loaded = 0;
        for mut rec in records {
            if rec.is_expired(self.ttl, now) {
                continue;
            }
            self.scorer.apply(&mut rec);
            self.records.insert(rec.gateway_id.clone(), rec);
            loaded += 1;
        }
        loaded
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
