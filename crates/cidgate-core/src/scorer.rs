// ── Scorer ──
//
// Pure mapping from a health record to `(score, status)`. No clock, no
// shared state: the same record and weights always give the same answer.

use crate::config::ScoringWeights;
use crate::model::{GatewayStatus, HealthRecord, Region};

/// Turns health history into a ranking score and a coarse status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorer {
    weights: ScoringWeights,
    preferred_region: Region,
}

impl Scorer {
    pub fn new(weights: ScoringWeights, preferred_region: Region) -> Self {
        Self {
            weights,
            preferred_region,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn preferred_region(&self) -> Region {
        self.preferred_region
    }

    /// Score and status for `record`.
    pub fn score(&self, record: &HealthRecord) -> (i64, GatewayStatus) {
        let w = &self.weights;

        let successes = i64::try_from(record.success_count).unwrap_or(i64::MAX);
        let failures = i64::try_from(record.failure_count).unwrap_or(i64::MAX);

        let bonus = successes
            .saturating_mul(w.success_bonus)
            .min(w.success_bonus_cap);
        let penalty = failures.saturating_mul(w.failure_penalty);
        let region = if record.region == self.preferred_region {
            w.region_bonus
        } else {
            0
        };

        let score = w
            .base_score
            .saturating_sub(self.latency_penalty(record.latency_ms))
            .saturating_add(bonus)
            .saturating_sub(penalty)
            .saturating_add(region)
            .max(0);

        (score, self.status(record))
    }

    /// Penalty for an observed latency. Anything at or past the cutoff,
    /// and a latency never observed, costs the maximum.
    pub fn latency_penalty(&self, latency_ms: Option<u64>) -> i64 {
        let cutoff = u64::try_from(self.weights.max_latency.as_millis()).unwrap_or(u64::MAX);
        let capped = latency_ms.map_or(cutoff, |ms| ms.min(cutoff));
        let capped = i64::try_from(capped).unwrap_or(i64::MAX);
        capped.saturating_mul(self.weights.latency_penalty_per_second) / 1000
    }

    /// Status from the failure streak alone.
    pub fn status(&self, record: &HealthRecord) -> GatewayStatus {
        if record.total_checks() == 0 {
            GatewayStatus::Unknown
        } else if record.consecutive_failures == 0 {
            GatewayStatus::Available
        } else if record.consecutive_failures > self.weights.unavailable_after {
            GatewayStatus::Unavailable
        } else {
            GatewayStatus::Degraded
        }
    }

    /// Recompute `score` and `status` in place.
    pub fn apply(&self, record: &mut HealthRecord) {
        let (score, status) = self.score(record);
        record.score = score;
        record.status = status;
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), Region::Cn)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::GatewayId;

    fn record(region: Region) -> HealthRecord {
        HealthRecord::new(GatewayId::from("gw"), region, Utc::now())
    }

    #[test]
    fn untested_gateway_is_unknown() {
        let (_, status) = Scorer::default().score(&record(Region::Intl));
        assert_eq!(status, GatewayStatus::Unknown);
    }

    #[test]
    fn fast_successful_gateway_scores_high() {
        let scorer = Scorer::default();
        let mut rec = record(Region::Intl);
        rec.success_count = 3;
        rec.latency_ms = Some(200);

        // 100 - 2 + 6
        assert_eq!(scorer.score(&rec), (104, GatewayStatus::Available));
    }

    #[test]
    fn preferred_region_gets_bonus() {
        let scorer = Scorer::default();
        let mut cn = record(Region::Cn);
        let mut intl = record(Region::Intl);
        for rec in [&mut cn, &mut intl] {
            rec.success_count = 1;
            rec.latency_ms = Some(1000);
        }
        let (cn_score, _) = scorer.score(&cn);
        let (intl_score, _) = scorer.score(&intl);
        assert_eq!(cn_score - intl_score, 10);
    }

    #[test]
    fn latency_penalty_is_capped_at_cutoff() {
        let scorer = Scorer::default();
        assert_eq!(scorer.latency_penalty(Some(5_000)), 50);
        assert_eq!(scorer.latency_penalty(Some(60_000)), 50);
        assert_eq!(scorer.latency_penalty(None), 50);
        assert_eq!(scorer.latency_penalty(Some(0)), 0);
    }

    #[test]
    fn success_bonus_is_capped() {
        let scorer = Scorer::default();
        let mut rec = record(Region::Intl);
        rec.success_count = 1_000;
        rec.latency_ms = Some(0);
        assert_eq!(scorer.score(&rec).0, 130);
    }

    #[test]
    fn score_never_goes_negative() {
        let scorer = Scorer::default();
        let mut rec = record(Region::Intl);
        rec.failure_count = 500;
        rec.consecutive_failures = 500;
        assert_eq!(scorer.score(&rec), (0, GatewayStatus::Unavailable));
    }

    #[test]
    fn streak_drives_status() {
        let scorer = Scorer::default();
        let mut rec = record(Region::Intl);
        rec.success_count = 1;
        rec.failure_count = 2;

        rec.consecutive_failures = 1;
        assert_eq!(scorer.status(&rec), GatewayStatus::Degraded);
        rec.consecutive_failures = 2;
        assert_eq!(scorer.status(&rec), GatewayStatus::Degraded);
        rec.consecutive_failures = 3;
        assert_eq!(scorer.status(&rec), GatewayStatus::Unavailable);
        rec.consecutive_failures = 0;
        assert_eq!(scorer.status(&rec), GatewayStatus::Available);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = Scorer::default();
        let mut rec = record(Region::Cn);
        rec.success_count = 7;
        rec.failure_count = 2;
        rec.consecutive_failures = 1;
        rec.latency_ms = Some(1_234);

        let first = scorer.score(&rec);
        let second = scorer.score(&rec);
        assert_eq!(first, second);
    }
}
