// ── Core error types ──
//
// Per-gateway failures are recovered locally and folded into the health
// store; only the variants below ever reach a caller. Transport-layer
// errors from `cidgate_api` are translated, never exposed raw.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{FailureKind, GatewayId};

/// One gateway's failure inside an aggregated diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    pub gateway_id: GatewayId,
    pub gateway_name: String,
    pub reason: FailureKind,
}

impl fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.gateway_name, self.gateway_id, self.reason)
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Probe errors ─────────────────────────────────────────────────
    #[error("Probe of {gateway} timed out after {timeout_ms}ms")]
    ProbeTimeout { gateway: GatewayId, timeout_ms: u64 },

    #[error("Probe of {gateway} failed: {reason}")]
    ProbeTransport { gateway: GatewayId, reason: String },

    #[error("Probe of {gateway} returned HTTP {status}")]
    ProbeHttp { gateway: GatewayId, status: u16 },

    // ── Fetch errors ─────────────────────────────────────────────────
    #[error("Gateway {gateway} served content that failed verification: {reason}")]
    IntegrityMismatch { gateway: GatewayId, reason: String },

    #[error("All {} candidate gateways failed for {cid}", .errors.len())]
    AllCandidatesExhausted {
        cid: String,
        errors: Vec<GatewayFailure>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid gateway configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Invalid CID '{cid}': {reason}")]
    InvalidCid { cid: String, reason: String },

    // ── Registry errors ──────────────────────────────────────────────
    #[error("Gateway not found: {id}")]
    GatewayNotFound { id: GatewayId },

    #[error("Gateway already exists: {id}")]
    GatewayExists { id: GatewayId },

    #[error("Gateway {id} is not a custom gateway")]
    NotCustom { id: GatewayId },

    #[error("Failed to fetch public gateway list {url}: {reason}")]
    GatewayList { url: String, reason: String },

    // ── State errors ─────────────────────────────────────────────────
    #[error("Failed to persist {what}: {message}")]
    Persistence { what: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Attach a gateway to a transport error from a probe.
    pub fn from_probe(gateway: &GatewayId, err: cidgate_api::Error) -> Self {
        match FailureKind::from(err) {
            FailureKind::Timeout { timeout_ms } => Self::ProbeTimeout {
                gateway: gateway.clone(),
                timeout_ms,
            },
            FailureKind::Http { status } => Self::ProbeHttp {
                gateway: gateway.clone(),
                status,
            },
            FailureKind::Transport { message } => Self::ProbeTransport {
                gateway: gateway.clone(),
                reason: message,
            },
            FailureKind::Integrity { message } => Self::IntegrityMismatch {
                gateway: gateway.clone(),
                reason: message,
            },
        }
    }

    /// Per-gateway detail, for variants that carry one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ProbeTimeout { timeout_ms, .. } => Some(FailureKind::Timeout {
                timeout_ms: *timeout_ms,
            }),
            Self::ProbeHttp { status, .. } => Some(FailureKind::Http { status: *status }),
            Self::ProbeTransport { reason, .. } => Some(FailureKind::Transport {
                message: reason.clone(),
            }),
            Self::IntegrityMismatch { reason, .. } => Some(FailureKind::Integrity {
                message: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            what: "state".into(),
            message: err.to_string(),
        }
    }
}
