// cidgate-core: gateway health tracking, ranking, and resilient CID fetching.
//
// The `Engine` is the single entry point. It discovers which IPFS gateways
// respond, scores them from their history, persists that history, marks
// chronically bad gateways for cleanup, and fetches content by trying
// ranked gateways one at a time until one delivers verified bytes.

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
mod gauge;
pub mod model;
pub mod prober;
pub mod ranking;
pub mod registry;
pub mod scorer;
pub mod store;

use std::time::Duration;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cleanup::{CleanupCandidate, CleanupReason};
pub use config::{
    CacheConfig, CleanupPolicy, EngineConfig, FetchConfig, HealthConfig, ProbeConfig,
    ScoringWeights, DEFAULT_PUBLIC_LIST, DEFAULT_TEST_CID, SWEEP_CACHE_VERSION,
};
pub use engine::{CleanupOutcome, CleanupRun, Engine, SweepReport};
pub use error::{CoreError, GatewayFailure};
pub use fetch::{FetchReport, FetchState, FetchedContent, FetchedFile, ResolvedUrl};
pub use registry::{GatewayRegistry, REGISTRY_FORMAT_VERSION};
pub use scorer::Scorer;

// Model types: the full domain vocabulary
pub use model::{
    CID_PLACEHOLDER, Cid, CustomGateway, DownloadMapping, FailureKind, GatewayConfig,
    GatewayEntry, GatewayId, GatewayOrigin, GatewayStatus, HealthRecord, ProbeOutcome,
    ProbeResult, RankedGateway, Region, SampleSource, normalize_template,
};

pub use cidgate_api::TransportConfig;

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
