// ── Ranking output ──

use serde::{Deserialize, Serialize};

use super::{GatewayConfig, GatewayStatus, HealthRecord};

/// One position in a ranked candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedGateway {
    /// 1-based position in the list.
    pub rank: usize,
    pub gateway: GatewayConfig,
    pub status: GatewayStatus,
    pub score: i64,
    pub latency_ms: Option<u64>,
}

/// A catalog entry with its current health, for management views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEntry {
    pub gateway: GatewayConfig,
    pub health: Option<HealthRecord>,
}
