// ── Download sessions ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cid, GatewayId};

/// Which gateways a download of `cid` has tried, kept so a retry can
/// skip straight past the ones that already failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMapping {
    pub cid: Cid,
    /// Every gateway attempted, in order.
    pub tried: Vec<GatewayId>,
    /// Subset of `tried` that failed.
    pub failed: Vec<GatewayId>,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DownloadMapping {
    pub fn new(
        cid: Cid,
        filename: Option<String>,
        now: DateTime<Utc>,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            cid,
            tried: Vec::new(),
            failed: Vec::new(),
            filename,
            size: None,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_failed(&self, id: &GatewayId) -> bool {
        self.failed.contains(id)
    }
}
