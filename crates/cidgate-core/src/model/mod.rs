// ── Domain model ──
//
// Fixed, tagged structs for everything the engine stores or hands out.

mod cid;
mod download;
pub(crate) mod gateway;
mod health;
mod probe;
mod ranked;

pub use cid::Cid;
pub use download::DownloadMapping;
pub use gateway::{
    CID_PLACEHOLDER, CustomGateway, GatewayConfig, GatewayId, GatewayOrigin, Region,
    normalize_template,
};
pub use health::{GatewayStatus, HealthRecord};
pub use probe::{FailureKind, ProbeOutcome, ProbeResult, SampleSource};
pub use ranked::{GatewayEntry, RankedGateway};
