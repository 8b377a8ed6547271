// ── Cleanup policy ──
//
// Marks chronically bad or stale gateways. Marking is side-effect free;
// removal happens only through `Engine::apply_cleanup` or when the policy
// has `auto_delete` set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CleanupPolicy;
use crate::model::{GatewayConfig, GatewayId, GatewayOrigin, HealthRecord};

/// Which threshold a gateway crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CleanupReason {
    TooManyFailures { failures: u64, max: u64 },
    FailureStreak { streak: u32, max: u32 },
    Idle { days: i64, max: u32 },
    LowScore { score: i64, min: i64 },
}

impl fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyFailures { failures, max } => {
                write!(f, "{failures} failures (max {max})")
            }
            Self::FailureStreak { streak, max } => {
                write!(f, "{streak} consecutive failures (max {max})")
            }
            Self::Idle { days, max } => write!(f, "idle {days} days (max {max})"),
            Self::LowScore { score, min } => write!(f, "score {score} (min {min})"),
        }
    }
}

/// A gateway marked for cleanup, with every threshold it crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCandidate {
    pub gateway_id: GatewayId,
    /// `None` when the record outlived its catalog entry.
    pub name: Option<String>,
    pub origin: Option<GatewayOrigin>,
    pub reasons: Vec<CleanupReason>,
}

impl CleanupPolicy {
    /// Every threshold `record` crosses. Empty means keep.
    pub fn evaluate(&self, record: &HealthRecord, now: DateTime<Utc>) -> Vec<CleanupReason> {
        let mut reasons = Vec::new();
        if record.failure_count > self.max_failures {
            reasons.push(CleanupReason::TooManyFailures {
                failures: record.failure_count,
                max: self.max_failures,
            });
        }
        if record.consecutive_failures > self.max_consecutive_failures {
            reasons.push(CleanupReason::FailureStreak {
                streak: record.consecutive_failures,
                max: self.max_consecutive_failures,
            });
        }
        let idle = record.idle_days(now);
        if idle > i64::from(self.max_idle_days) {
            reasons.push(CleanupReason::Idle {
                days: idle,
                max: self.max_idle_days,
            });
        }
        if record.score < self.min_score {
            reasons.push(CleanupReason::LowScore {
                score: record.score,
                min: self.min_score,
            });
        }
        reasons
    }

    /// Candidates among `records`, in record order.
    pub fn report<F>(
        &self,
        records: &[HealthRecord],
        now: DateTime<Utc>,
        lookup: F,
    ) -> Vec<CleanupCandidate>
    where
        F: Fn(&GatewayId) -> Option<GatewayConfig>,
    {
        records
            .iter()
            .filter_map(|rec| {
                let reasons = self.evaluate(rec, now);
                if reasons.is_empty() {
                    return None;
                }
                let gw = lookup(&rec.gateway_id);
                Some(CleanupCandidate {
                    gateway_id: rec.gateway_id.clone(),
                    name: gw.as_ref().map(|g| g.name.clone()),
                    origin: gw.map(|g| g.origin),
                    reasons,
                })
            })
            .collect()
    }
}
