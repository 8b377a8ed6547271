// ── Engine configuration ──
//
// Every tunable weight, threshold, and timeout of the engine in one
// object. Core never reads config files: the config crate (or a test)
// builds an `EngineConfig` and hands it to `Engine::new`.

use std::path::PathBuf;
use std::time::Duration;

use cidgate_api::TransportConfig;

use crate::model::Region;

/// Sweep cache format version. Bumping it invalidates every cached sweep.
pub const SWEEP_CACHE_VERSION: u32 = 3;

/// Public gateway list maintained by the IPFS project.
pub const DEFAULT_PUBLIC_LIST: &str =
    "https://raw.githubusercontent.com/ipfs/public-gateway-checker/main/src/gateways.json";

/// Identity CID of the empty raw block; every gateway can answer it
/// without touching the network.
pub const DEFAULT_TEST_CID: &str = "bafkqaaa";

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Region whose gateways receive the scoring region bonus.
    pub preferred_region: Region,
    pub probe: ProbeConfig,
    pub scoring: ScoringWeights,
    pub health: HealthConfig,
    pub cleanup: CleanupPolicy,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub transport: TransportConfig,
    /// Directory for persisted health, sweep, and registry state.
    /// `None` keeps everything in memory.
    pub state_dir: Option<PathBuf>,
    /// Public gateway list URLs consulted by `refresh_public_gateways`.
    pub public_lists: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_region: Region::Cn,
            probe: ProbeConfig::default(),
            scoring: ScoringWeights::default(),
            health: HealthConfig::default(),
            cleanup: CleanupPolicy::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            transport: TransportConfig::default(),
            state_dir: None,
            public_lists: vec![DEFAULT_PUBLIC_LIST.to_owned()],
        }
    }
}

/// Prober tuning.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Maximum probes in flight during a sweep.
    pub concurrency: usize,
    /// Deadline for a single probe attempt.
    pub timeout: Duration,
    /// Extra attempts after a failed probe before it counts as a failure.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// CID requested by every probe.
    pub test_cid: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(10),
            retries: 1,
            retry_delay: Duration::from_secs(1),
            test_cid: DEFAULT_TEST_CID.to_owned(),
        }
    }
}

/// Weights of the scoring function.
///
/// `score = base - latency_penalty + min(successes * bonus, cap)
///          - failures * penalty + region_bonus`, floored at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringWeights {
    pub base_score: i64,
    /// Points lost per second of observed latency.
    pub latency_penalty_per_second: i64,
    /// Latencies at or above this are penalised identically.
    pub max_latency: Duration,
    pub success_bonus: i64,
    /// Upper bound on the accumulated success bonus.
    pub success_bonus_cap: i64,
    pub failure_penalty: i64,
    pub region_bonus: i64,
    /// A gateway whose failure streak exceeds this is `unavailable`.
    pub unavailable_after: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base_score: 100,
            latency_penalty_per_second: 10,
            max_latency: Duration::from_millis(5000),
            success_bonus: 2,
            success_bonus_cap: 30,
            failure_penalty: 5,
            region_bonus: 10,
            unavailable_after: 2,
        }
    }
}

/// Health store retention.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Records older than this are dropped and rebuilt from scratch.
    pub ttl: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Thresholds that flag a gateway for cleanup. Any one is enough.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    pub max_failures: u64,
    pub max_consecutive_failures: u32,
    pub max_idle_days: u32,
    pub min_score: i64,
    /// Remove flagged gateways automatically instead of only reporting them.
    pub auto_delete: bool,
    /// Period of the background cleanup task. Zero disables it.
    pub interval: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            max_consecutive_failures: 3,
            max_idle_days: 30,
            min_score: 10,
            auto_delete: false,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Sweep cache freshness.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Format version stamped on stored sweeps; see [`SWEEP_CACHE_VERSION`].
    pub version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60),
            version: SWEEP_CACHE_VERSION,
        }
    }
}

/// Selector / fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Candidates pre-checked concurrently before the first transfer.
    pub parallel_gateways: usize,
    /// Deadline for the metadata pre-check and range verification.
    pub metadata_timeout: Duration,
    /// Deadline for a whole transfer, body included.
    pub download_timeout: Duration,
    /// Objects larger than this skip range verification.
    pub verify_size_ceiling: u64,
    /// Bytes requested by the range verification read.
    pub range_probe_bytes: u64,
    /// Lifetime of a download session's record of tried gateways.
    pub mapping_ttl: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            parallel_gateways: 3,
            metadata_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            verify_size_ceiling: 200 * 1024 * 1024,
            range_probe_bytes: 1024,
            mapping_ttl: Duration::from_secs(60 * 60),
        }
    }
}
