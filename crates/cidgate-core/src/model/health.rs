// ── Per-gateway health history ──

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{GatewayId, ProbeOutcome, ProbeResult, Region};

/// Coarse availability verdict derived by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GatewayStatus {
    #[default]
    Unknown,
    Available,
    Degraded,
    Unavailable,
}

impl GatewayStatus {
    /// Sort key for ranking: lower ranks first.
    ///
    /// An untested gateway might be fine, so it sits between
    /// `degraded` and `unavailable`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Degraded => 1,
            Self::Unknown => 2,
            Self::Unavailable => 3,
        }
    }
}

/// Mutable health record, one per gateway id.
///
/// Counters only grow within a record's lifetime; the whole record is
/// replaced once it outlives the health TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub gateway_id: GatewayId,
    pub region: Region,
    pub status: GatewayStatus,
    pub latency_ms: Option<u64>,
    pub success_count: u64,
    pub failure_count: u64,
    /// Reset to 0 by any success, incremented by every failure.
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub score: i64,
    pub supports_range: bool,
    pub supports_cors: bool,
}

impl HealthRecord {
    pub fn new(gateway_id: GatewayId, region: Region, now: DateTime<Utc>) -> Self {
        Self {
            gateway_id,
            region,
            status: GatewayStatus::Unknown,
            latency_ms: None,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            created_at: now,
            last_checked: None,
            last_success: None,
            last_error: None,
            score: 0,
            supports_range: false,
            supports_cors: false,
        }
    }

    /// Fold one observation into the counters. Score and status are
    /// recomputed by the caller.
    pub fn record(&mut self, result: &ProbeResult) {
        self.last_checked = Some(result.observed_at);
        match &result.outcome {
            ProbeOutcome::Success => {
                self.success_count = self.success_count.saturating_add(1);
                self.consecutive_failures = 0;
                self.last_success = Some(result.observed_at);
                if result.latency_ms.is_some() {
                    self.latency_ms = result.latency_ms;
                }
                // Only probes look at capability headers; downloads keep
                // whatever the last probe saw.
                if result.source == super::SampleSource::Probe {
                    self.supports_range = result.range;
                    self.supports_cors = result.cors;
                }
            }
            ProbeOutcome::Failure { reason } => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_error = Some(reason.to_string());
            }
        }
    }

    pub fn total_checks(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    /// `true` once the record has outlived `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        age(self.created_at, now) > ttl
    }

    /// Whole days since the last successful access, or since creation if
    /// the gateway never succeeded.
    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        let since = self.last_success.unwrap_or(self.created_at);
        (now - since).num_days().max(0)
    }
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
