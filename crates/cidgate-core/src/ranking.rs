// ── Ranking ──

use crate::model::{GatewayConfig, GatewayStatus, HealthRecord, RankedGateway};
use crate::scorer::Scorer;

/// Merge catalog entries with their health and order them:
/// status rank, then score descending, then priority ascending. The sort
/// is stable, so remaining ties keep catalog order.
///
/// Gateways without a record are scored as a fresh record would be and
/// carry `unknown` status.
pub fn rank<F>(gateways: Vec<GatewayConfig>, scorer: &Scorer, health: F) -> Vec<RankedGateway>
where
    F: Fn(&GatewayConfig) -> Option<HealthRecord>,
{
    let mut ranked: Vec<RankedGateway> = gateways
        .into_iter()
        .map(|gateway| {
            let (score, status, latency_ms) = match health(&gateway) {
                Some(rec) => (rec.score, rec.status, rec.latency_ms),
                None => {
                    let blank =
                        HealthRecord::new(gateway.id.clone(), gateway.region, chrono::Utc::now());
                    let (score, _) = scorer.score(&blank);
                    (score, GatewayStatus::Unknown, None)
                }
            };
            RankedGateway {
                rank: 0,
                gateway,
                status,
                score,
                latency_ms,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.status
            .rank()
            .cmp(&b.status.rank())
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| a.gateway.priority.cmp(&b.gateway.priority))
    });
    for (i, entry) in ranked.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    ranked
}
