// ── Gateway registry ──
//
// The catalog of candidate gateways: a built-in seed list, user-added
// custom entries, and entries imported from public gateway lists.
// Insertion order is preserved; ranking uses it as the final tie-break.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::model::{CustomGateway, GatewayConfig, GatewayId, GatewayOrigin, Region};

/// Format version of the persisted registry document.
pub const REGISTRY_FORMAT_VERSION: u32 = 1;

/// (name, url template, region, icon)
const BUILTIN_GATEWAYS: &[(&str, &str, Region, &str)] = &[
    ("4EVERLAND", "https://ipfs.4everland.io/ipfs/{cid}", Region::Cn, "🌏"),
    ("Crust", "https://gw.crustfiles.app/ipfs/{cid}", Region::Cn, "🦀"),
    ("IPFS.io", "https://ipfs.io/ipfs/{cid}", Region::Intl, "🌐"),
    ("dweb.link", "https://{cid}.ipfs.dweb.link", Region::Intl, "🔗"),
    ("w3s.link", "https://{cid}.ipfs.w3s.link", Region::Intl, "🛰"),
    ("Pinata", "https://gateway.pinata.cloud/ipfs/{cid}", Region::Intl, "🪅"),
    ("Cloudflare", "https://cloudflare-ipfs.com/ipfs/{cid}", Region::Intl, "☁"),
    ("NFT.Storage", "https://nftstorage.link/ipfs/{cid}", Region::Intl, "🗄"),
];

/// The built-in seed list, priorities in declaration order starting at 1.
pub fn builtin_gateways() -> Vec<GatewayConfig> {
    BUILTIN_GATEWAYS
        .iter()
        .zip(1u32..)
        .filter_map(|(&(name, url, region, icon), priority)| {
            GatewayConfig::new(name, url, priority, region, GatewayOrigin::BuiltIn)
                .map(|gw| gw.with_icon(icon))
                .ok()
        })
        .collect()
}

/// Persisted registry state. Built-ins are re-seeded on every start, so
/// only their removals are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Custom and fetched-public entries, in insertion order.
    pub entries: Vec<GatewayConfig>,
    /// Built-in ids removed by cleanup.
    #[serde(default)]
    pub removed_builtins: Vec<GatewayId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: IndexMap<GatewayId, GatewayConfig>,
    removed_builtins: Vec<GatewayId>,
}

/// Thread-safe gateway catalog.
#[derive(Debug, Default)]
pub struct GatewayRegistry {
    state: RwLock<RegistryState>,
}

impl GatewayRegistry {
    /// A registry holding exactly `entries`, in order. Later duplicates
    /// of an id are dropped.
    pub fn new(entries: impl IntoIterator<Item = GatewayConfig>) -> Self {
        let mut map = IndexMap::new();
        for gw in entries {
            map.entry(gw.id.clone()).or_insert(gw);
        }
        Self {
            state: RwLock::new(RegistryState {
                entries: map,
                removed_builtins: Vec::new(),
            }),
        }
    }

    /// A registry seeded with the built-in gateways.
    pub fn with_builtins() -> Self {
        Self::new(builtin_gateways())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn list(&self) -> Vec<GatewayConfig> {
        self.read().entries.values().cloned().collect()
    }

    pub fn get(&self, id: &GatewayId) -> Option<GatewayConfig> {
        self.read().entries.get(id).cloned()
    }

    pub fn contains(&self, id: &GatewayId) -> bool {
        self.read().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Validate and add a user gateway. Fails with `ConfigInvalid` before
    /// anything is inserted, or `GatewayExists` if the id is taken.
    pub fn add_custom(&self, custom: CustomGateway) -> Result<GatewayConfig, CoreError> {
        let mut state = self.write();
        let priority = custom
            .priority
            .unwrap_or_else(|| next_priority(&state.entries));
        let mut gw = GatewayConfig::new(
            custom.name,
            &custom.url,
            priority,
            custom.region.unwrap_or_default(),
            GatewayOrigin::Custom,
        )?;
        if let Some(icon) = custom.icon.filter(|i| !i.trim().is_empty()) {
            gw = gw.with_icon(icon);
        }

        if state.entries.contains_key(&gw.id) {
            return Err(CoreError::GatewayExists { id: gw.id });
        }
        state.entries.insert(gw.id.clone(), gw.clone());
        debug!(gateway = %gw.id, priority, "custom gateway added");
        Ok(gw)
    }

    /// Remove a user gateway. Built-in and imported entries are refused.
    pub fn remove_custom(&self, id: &GatewayId) -> Result<GatewayConfig, CoreError> {
        let mut state = self.write();
        match state.entries.get(id) {
            None => Err(CoreError::GatewayNotFound { id: id.clone() }),
            Some(gw) if !gw.is_custom() => Err(CoreError::NotCustom { id: id.clone() }),
            Some(_) => state
                .entries
                .shift_remove(id)
                .ok_or_else(|| CoreError::GatewayNotFound { id: id.clone() }),
        }
    }

    /// Remove any entry regardless of origin (cleanup path).
    pub fn remove(&self, id: &GatewayId) -> Option<GatewayConfig> {
        let mut state = self.write();
        let removed = state.entries.shift_remove(id)?;
        if removed.origin == GatewayOrigin::BuiltIn && !state.removed_builtins.contains(id) {
            state.removed_builtins.push(id.clone());
        }
        Some(removed)
    }

    /// Import public list templates as `fetched-public` entries, skipping
    /// malformed templates and ids already present. Returns how many were added.
    pub fn merge_public<S: AsRef<str>>(&self, templates: &[S]) -> usize {
        let mut state = self.write();
        let mut added = 0;
        for raw in templates {
            let raw = raw.as_ref();
            let priority = next_priority(&state.entries);
            let gw = match GatewayConfig::new(
                "",
                raw,
                priority,
                Region::Intl,
                GatewayOrigin::FetchedPublic,
            ) {
                Ok(gw) => gw,
                Err(e) => {
                    debug!(template = raw, error = %e, "skipping public gateway");
                    continue;
                }
            };
            if state.entries.contains_key(&gw.id) || state.removed_builtins.contains(&gw.id) {
                continue;
            }
            state.entries.insert(gw.id.clone(), gw);
            added += 1;
        }
        added
    }

    // ── Persistence ──────────────────────────────────────────────────

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.read();
        RegistrySnapshot {
            entries: state
                .entries
                .values()
                .filter(|gw| gw.origin != GatewayOrigin::BuiltIn)
                .cloned()
                .collect(),
            removed_builtins: state.removed_builtins.clone(),
        }
    }

    /// Layer a persisted snapshot over the current (built-in) entries.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let mut state = self.write();
        for id in &snapshot.removed_builtins {
            state.entries.shift_remove(id);
        }
        state.removed_builtins = snapshot.removed_builtins;
        for gw in snapshot.entries {
            if gw.origin == GatewayOrigin::BuiltIn {
                continue;
            }
            state.entries.entry(gw.id.clone()).or_insert(gw);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_priority(entries: &IndexMap<GatewayId, GatewayConfig>) -> u32 {
    entries
        .values()
        .map(|gw| gw.priority)
        .max()
        .map_or(1, |p| p.saturating_add(1))
}
