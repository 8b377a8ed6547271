// ── Engine facade ──
//
// Full lifecycle management for the gateway health & selection engine.
// Owns the registry, health store, sweep cache, prober, and fetcher, and
// coordinates persistence and the background cleanup task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cidgate_api::GatewayClient;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cleanup::CleanupCandidate;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::fetch::{FetchedContent, FetchedFile, Fetcher, ResolvedUrl};
use crate::model::{
    Cid, CustomGateway, GatewayConfig, GatewayEntry, GatewayId, HealthRecord, RankedGateway,
};
use crate::prober::Prober;
use crate::ranking;
use crate::registry::{GatewayRegistry, REGISTRY_FORMAT_VERSION, RegistrySnapshot};
use crate::scorer::Scorer;
use crate::store::{CachedSweep, HEALTH_FORMAT_VERSION, HealthStore, StateFile, SweepCache};

const HEALTH_NAMESPACE: &str = "cidgate.health";
const SWEEP_NAMESPACE: &str = "cidgate.sweep";
const REGISTRY_NAMESPACE: &str = "cidgate.gateways";

// ── Public result types ──────────────────────────────────────────────

/// Result of [`Engine::refresh_sweep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub ranked: Vec<RankedGateway>,
    /// Served from the sweep cache; nothing was probed.
    pub from_cache: bool,
    /// Cancelled before every probe finished. Never cached.
    pub cancelled: bool,
    /// Gateways in the catalog when the sweep started.
    pub requested: usize,
    /// Probes that finished and were merged into the health store.
    pub probed: usize,
    pub succeeded: usize,
    pub swept_at: DateTime<Utc>,
}

/// Result of [`Engine::apply_cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub removed: Vec<GatewayConfig>,
    /// Requested ids that were not marked for cleanup and were left alone.
    pub skipped: Vec<GatewayId>,
}

/// Result of one scheduled (or manual) cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRun {
    pub expired_records: usize,
    pub expired_mappings: usize,
    pub marked: Vec<CleanupCandidate>,
    /// Gateways removed because `auto_delete` is on.
    pub removed: Vec<GatewayId>,
}

/// Where each persisted document lives.
#[derive(Debug, Clone)]
struct StateFiles {
    health: StateFile,
    sweep: StateFile,
    registry: StateFile,
}

impl StateFiles {
    fn new(dir: &Path, cache_version: u32) -> Self {
        Self {
            health: StateFile::new(
                dir.join("health.json"),
                HEALTH_NAMESPACE,
                HEALTH_FORMAT_VERSION,
            ),
            sweep: StateFile::new(dir.join("sweep.json"), SWEEP_NAMESPACE, cache_version),
            registry: StateFile::new(
                dir.join("gateways.json"),
                REGISTRY_NAMESPACE,
                REGISTRY_FORMAT_VERSION,
            ),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The gateway health & selection engine.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Construct with
/// [`Engine::new`] or [`Engine::open`], call [`start`](Self::start) for
/// scheduled cleanup, and [`shutdown`](Self::shutdown) before exit.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    client: GatewayClient,
    registry: GatewayRegistry,
    health: Arc<HealthStore>,
    cache: SweepCache,
    prober: Prober,
    fetcher: Fetcher,
    files: Option<StateFiles>,
    /// Serializes sweeps; a second caller waits and may reuse the result.
    sweep_lock: Mutex<()>,
    /// Tokens of sweeps running or queued on `sweep_lock`, by ticket.
    sweep_cancel: Mutex<Vec<(u64, CancellationToken)>>,
    next_sweep: AtomicU64,
    /// Serializes state writes so the newest snapshot lands last.
    save_lock: Mutex<()>,
    /// Token handed to fetches; replaced after `cancel_fetches`.
    fetch_cancel: Mutex<CancellationToken>,
    cancel: CancellationToken,
    /// Child token for background tasks, replaced on every `start`.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Engine over the built-in gateway list. Persisted state is not read;
    /// see [`open`](Self::open).
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        Self::with_registry(config, GatewayRegistry::with_builtins())
    }

    /// Engine over exactly `gateways`, with no built-ins.
    pub fn with_gateways(
        config: EngineConfig,
        gateways: Vec<GatewayConfig>,
    ) -> Result<Self, CoreError> {
        Self::with_registry(config, GatewayRegistry::new(gateways))
    }

    fn with_registry(config: EngineConfig, registry: GatewayRegistry) -> Result<Self, CoreError> {
        let client = GatewayClient::new(&config.transport).map_err(|e| CoreError::ConfigInvalid {
            message: e.to_string(),
        })?;
        let scorer = Scorer::new(config.scoring.clone(), config.preferred_region);
        let health = Arc::new(HealthStore::new(scorer, config.health.ttl));
        let cache = SweepCache::new(config.cache.version, config.cache.ttl);
        let prober = Prober::new(client.clone(), config.probe.clone())?;
        let fetcher = Fetcher::new(client.clone(), config.fetch.clone(), Arc::clone(&health));
        let files = config
            .state_dir
            .as_deref()
            .map(|dir| StateFiles::new(dir, config.cache.version));
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let fetch_cancel = cancel.child_token();

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                client,
                registry,
                health,
                cache,
                prober,
                fetcher,
                files,
                sweep_lock: Mutex::new(()),
                sweep_cancel: Mutex::new(Vec::new()),
                next_sweep: AtomicU64::new(0),
                save_lock: Mutex::new(()),
                fetch_cancel: Mutex::new(fetch_cancel),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// [`new`](Self::new), then load persisted state from the state directory.
    pub async fn open(config: EngineConfig) -> Result<Self, CoreError> {
        let engine = Self::new(config)?;
        engine.load_state().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.inner.config.state_dir.as_deref()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the scheduled cleanup task. A zero interval disables it, and
    /// calling this while the task is running does nothing.
    pub async fn start(&self) {
        let interval = self.inner.config.cleanup.interval;
        if interval.is_zero() {
            debug!("scheduled cleanup disabled");
            return;
        }

        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        if !handles.is_empty() {
            debug!("cleanup task already running");
            return;
        }

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();
        handles.push(tokio::spawn(cleanup_task(self.clone(), interval, child)));
        debug!(interval_secs = interval.as_secs(), "cleanup task started");
    }

    /// Cancel in-flight work and background tasks, join them, and persist.
    pub async fn shutdown(&self) {
        self.cancel_sweep().await;
        self.cancel_fetches().await;
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.persist().await;
        debug!("engine shut down");
    }

    // ── Catalog ──────────────────────────────────────────────────────

    /// Every catalog entry with its current health, in catalog order.
    pub fn list_gateways(&self) -> Vec<GatewayEntry> {
        self.inner
            .registry
            .list()
            .into_iter()
            .map(|gateway| {
                let health = self.inner.health.get(&gateway.id);
                GatewayEntry { gateway, health }
            })
            .collect()
    }

    pub fn health_record(&self, id: &GatewayId) -> Option<HealthRecord> {
        self.inner.health.get(id)
    }

    pub async fn add_custom_gateway(
        &self,
        custom: CustomGateway,
    ) -> Result<GatewayConfig, CoreError> {
        let gw = self.inner.registry.add_custom(custom)?;
        info!(gateway = %gw.id, "custom gateway added");
        self.inner.cache.invalidate();
        self.persist().await;
        Ok(gw)
    }

    pub async fn remove_custom_gateway(&self, id: &GatewayId) -> Result<GatewayConfig, CoreError> {
        let gw = self.inner.registry.remove_custom(id)?;
        self.inner.health.remove(id);
        info!(gateway = %id, "custom gateway removed");
        self.inner.cache.invalidate();
        self.persist().await;
        Ok(gw)
    }

    /// Import every configured public gateway list. Returns how many new
    /// gateways were added. Fails only if every list failed.
    pub async fn refresh_public_gateways(&self) -> Result<usize, CoreError> {
        let lists = &self.inner.config.public_lists;
        let timeout = self.inner.config.fetch.metadata_timeout;
        let mut added = 0;
        let mut fetched = 0;
        let mut first_error = None;

        for url in lists {
            match self.inner.client.fetch_gateway_list(url, timeout).await {
                Ok(templates) => {
                    let n = self.inner.registry.merge_public(&templates);
                    info!(
                        list = %url,
                        offered = templates.len(),
                        added = n,
                        "public gateway list imported"
                    );
                    fetched += 1;
                    added += n;
                }
                Err(e) => {
                    warn!(list = %url, error = %e, "public gateway list unavailable");
                    first_error.get_or_insert(CoreError::GatewayList {
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if fetched == 0 {
            if let Some(err) = first_error {
                return Err(err);
            }
        }
        if added > 0 {
            self.inner.cache.invalidate();
            self.persist().await;
        }
        Ok(added)
    }

    // ── Sweeps ───────────────────────────────────────────────────────

    /// Probe every gateway and return the ranked list, unless a fresh
    /// cached sweep exists and `force` is false.
    ///
    /// Cancellable via [`cancel_sweep`](Self::cancel_sweep): finished probes
    /// are merged, the rest are abandoned, and the partial list is
    /// returned but not cached. A sweep cancelled while still queued
    /// behind another one returns without probing.
    pub async fn refresh_sweep(&self, force: bool) -> Result<SweepReport, CoreError> {
        if !force {
            if let Some(cached) = self.inner.cache.get_if_fresh() {
                return Ok(cached_report(&cached));
            }
        }

        let ticket = self.inner.next_sweep.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.cancel.child_token();
        self.inner
            .sweep_cancel
            .lock()
            .await
            .push((ticket, token.clone()));

        let report = self.run_sweep(force, &token).await;
        self.inner
            .sweep_cancel
            .lock()
            .await
            .retain(|(id, _)| *id != ticket);
        report
    }

    async fn run_sweep(
        &self,
        force: bool,
        token: &CancellationToken,
    ) -> Result<SweepReport, CoreError> {
        let _sweep = self.inner.sweep_lock.lock().await;
        // Someone else may have finished a sweep while we waited.
        if !force {
            if let Some(cached) = self.inner.cache.get_if_fresh() {
                return Ok(cached_report(&cached));
            }
        }

        let gateways = self.inner.registry.list();
        if token.is_cancelled() {
            info!(gateways = gateways.len(), "sweep cancelled before it started");
            return Ok(SweepReport {
                ranked: self.ranked(),
                from_cache: false,
                cancelled: true,
                requested: gateways.len(),
                probed: 0,
                succeeded: 0,
                swept_at: Utc::now(),
            });
        }

        info!(gateways = gateways.len(), "sweep started");
        let outcome = self.inner.prober.sweep(&gateways, token).await;

        let mut succeeded = 0;
        for result in &outcome.results {
            // Gateways removed mid-sweep are not recorded.
            let Some(gw) = self.inner.registry.get(&result.gateway_id) else {
                continue;
            };
            if result.is_success() {
                succeeded += 1;
            }
            self.inner.health.upsert(&gw.id, gw.region, result);
        }

        let ranked = self.ranked();
        if !outcome.cancelled {
            self.inner.cache.store(ranked.clone());
        }
        info!(
            probed = outcome.results.len(),
            succeeded,
            cancelled = outcome.cancelled,
            "sweep finished"
        );
        self.persist().await;

        Ok(SweepReport {
            ranked,
            from_cache: false,
            cancelled: outcome.cancelled,
            requested: outcome.requested,
            probed: outcome.results.len(),
            succeeded,
            swept_at: Utc::now(),
        })
    }

    /// Abort the sweep in flight and any queued behind it. Returns `false`
    /// if there was nothing to cancel.
    pub async fn cancel_sweep(&self) -> bool {
        let pending: Vec<_> = self.inner.sweep_cancel.lock().await.drain(..).collect();
        for (_, token) in &pending {
            token.cancel();
        }
        !pending.is_empty()
    }

    /// The last cached sweep, fresh or not.
    pub fn cached_sweep(&self) -> Option<Arc<CachedSweep>> {
        self.inner.cache.current()
    }

    /// Ranked list from live health state. Never reads the sweep cache.
    pub fn ranked(&self) -> Vec<RankedGateway> {
        let health = &self.inner.health;
        ranking::rank(self.inner.registry.list(), health.scorer(), |gw| {
            health.get(&gw.id)
        })
    }

    /// Highest number of probes the prober ever had in flight at once.
    pub fn peak_concurrent_probes(&self) -> usize {
        self.inner.prober.peak_in_flight()
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Resilient download of `cid` into memory.
    ///
    /// The whole body is buffered before this returns, so peak memory is
    /// the object size. Use [`smart_fetch_to_file`](Self::smart_fetch_to_file)
    /// for large objects; it streams to disk.
    pub async fn smart_fetch(
        &self,
        cid: &str,
        filename: Option<String>,
    ) -> Result<FetchedContent, CoreError> {
        let cid = Cid::parse(cid)?;
        let token = self.inner.fetch_cancel.lock().await.clone();
        let result = self
            .inner
            .fetcher
            .fetch(&cid, filename, self.ranked(), &token)
            .await;
        self.after_fetch(&result).await;
        result
    }

    /// Resilient download of `cid` to `dest`, via `<dest>.part`.
    pub async fn smart_fetch_to_file(
        &self,
        cid: &str,
        dest: impl Into<PathBuf>,
    ) -> Result<FetchedFile, CoreError> {
        let cid = Cid::parse(cid)?;
        let token = self.inner.fetch_cancel.lock().await.clone();
        let result = self
            .inner
            .fetcher
            .fetch_to_file(&cid, dest.into(), self.ranked(), &token)
            .await;
        self.after_fetch(&result).await;
        result
    }

    /// Best verified direct URL for `cid`, without transferring the body.
    pub async fn resolve_url(&self, cid: &str) -> Result<ResolvedUrl, CoreError> {
        let cid = Cid::parse(cid)?;
        let token = self.inner.fetch_cancel.lock().await.clone();
        let result = self.inner.fetcher.resolve(&cid, self.ranked(), &token).await;
        self.after_fetch(&result).await;
        result
    }

    /// Cancel every fetch in flight. Later fetches are unaffected.
    pub async fn cancel_fetches(&self) {
        let mut token = self.inner.fetch_cancel.lock().await;
        token.cancel();
        *token = self.inner.cancel.child_token();
    }

    /// Highest number of transfers ever streaming at once.
    pub fn peak_concurrent_transfers(&self) -> usize {
        self.inner.fetcher.peak_concurrent_transfers()
    }

    async fn after_fetch<T>(&self, result: &Result<T, CoreError>) {
        if !matches!(result, Err(CoreError::Cancelled)) {
            self.persist().await;
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────

    /// Gateways currently marked for cleanup.
    pub fn cleanup_report(&self) -> Vec<CleanupCandidate> {
        let records = self.inner.health.snapshot();
        self.inner
            .config
            .cleanup
            .report(&records, Utc::now(), |id| self.inner.registry.get(id))
    }

    /// Remove the listed gateways, provided they are still marked.
    pub async fn apply_cleanup(&self, ids: &[GatewayId]) -> CleanupOutcome {
        let outcome = self.remove_marked(ids);
        if !outcome.removed.is_empty() {
            self.inner.cache.invalidate();
            self.persist().await;
        }
        outcome
    }

    /// One cleanup pass: expire old health records and download sessions,
    /// mark bad gateways, and remove them when `auto_delete` is on.
    pub async fn run_cleanup(&self) -> CleanupRun {
        let expired_records = self.inner.health.sweep_expired();
        let expired_mappings = self.inner.fetcher.sweep_expired_mappings();
        let marked = self.cleanup_report();

        let removed = if self.inner.config.cleanup.auto_delete && !marked.is_empty() {
            let ids: Vec<GatewayId> = marked.iter().map(|c| c.gateway_id.clone()).collect();
            self.remove_marked(&ids)
                .removed
                .into_iter()
                .map(|gw| gw.id)
                .collect()
        } else {
            Vec::new()
        };

        if !removed.is_empty() {
            self.inner.cache.invalidate();
        }
        info!(
            expired_records,
            expired_mappings,
            marked = marked.len(),
            removed = removed.len(),
            "cleanup pass finished"
        );
        self.persist().await;

        CleanupRun {
            expired_records,
            expired_mappings,
            marked,
            removed,
        }
    }

    fn remove_marked(&self, ids: &[GatewayId]) -> CleanupOutcome {
        let marked: Vec<GatewayId> = self
            .cleanup_report()
            .into_iter()
            .map(|c| c.gateway_id)
            .collect();
        let mut outcome = CleanupOutcome::default();

        for id in ids {
            if !marked.contains(id) {
                outcome.skipped.push(id.clone());
                continue;
            }
            self.inner.health.remove(id);
            if let Some(gw) = self.inner.registry.remove(id) {
                info!(gateway = %id, origin = %gw.origin, "gateway removed by cleanup");
                outcome.removed.push(gw);
            }
        }
        outcome
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write health, sweep cache, and registry to the state directory.
    /// A no-op when no state directory is configured.
    pub async fn save_state(&self) -> Result<(), CoreError> {
        let Some(files) = &self.inner.files else {
            return Ok(());
        };
        let _save = self.inner.save_lock.lock().await;
        files.health.save(&self.inner.health.snapshot()).await?;
        if let Some(sweep) = self.inner.cache.current() {
            files.sweep.save(sweep.as_ref()).await?;
        }
        files.registry.save(&self.inner.registry.snapshot()).await?;
        Ok(())
    }

    /// Read persisted state. Documents that are missing or carry another
    /// format version are skipped.
    pub async fn load_state(&self) -> Result<(), CoreError> {
        let Some(files) = &self.inner.files else {
            return Ok(());
        };

        if let Some(snapshot) = files.registry.load::<RegistrySnapshot>().await? {
            self.inner.registry.restore(snapshot);
        }
        if let Some(records) = files.health.load::<Vec<HealthRecord>>().await? {
            let loaded = self.inner.health.restore(records);
            debug!(loaded, "health records restored");
        }
        if let Some(sweep) = files.sweep.load::<CachedSweep>().await? {
            self.inner.cache.restore(sweep);
        }
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.save_state().await {
            warn!(error = %e, "failed to persist engine state");
        }
    }
}

fn cached_report(cached: &CachedSweep) -> SweepReport {
    debug!(age_secs = cached.age(Utc::now()).as_secs(), "serving sweep from cache");
    SweepReport {
        ranked: cached.ranked.clone(),
        from_cache: true,
        cancelled: false,
        requested: cached.ranked.len(),
        probed: 0,
        succeeded: 0,
        swept_at: cached.stored_at,
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically run a cleanup pass.
async fn cleanup_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let run = engine.run_cleanup().await;
                if !run.marked.is_empty() {
                    debug!(marked = run.marked.len(), "gateways marked for cleanup");
                }
            }
        }
    }
}
