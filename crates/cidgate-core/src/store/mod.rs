// ── Shared engine state ──
//
// The health store and the sweep cache are the two pieces of mutable state
// shared by the prober, the fetcher, and status readers. `persist` writes
// both (and the registry) as versioned JSON documents.

mod health_store;
mod persist;
mod sweep_cache;

pub use health_store::{HEALTH_FORMAT_VERSION, HealthStore};
pub use persist::StateFile;
pub use sweep_cache::{CachedSweep, SweepCache};
