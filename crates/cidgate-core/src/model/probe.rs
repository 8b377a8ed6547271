// ── Raw observations ──
//
// A `ProbeResult` is one observation of one gateway, produced either by
// the prober or by a real download attempt. Never persisted directly;
// the health store folds it into a `HealthRecord`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use super::GatewayId;

/// Which code path produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SampleSource {
    Probe,
    Download,
}

/// Why a probe or download attempt against a gateway failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("integrity check failed: {message}")]
    Integrity { message: String },
}

impl From<cidgate_api::Error> for FailureKind {
    fn from(err: cidgate_api::Error) -> Self {
        match err {
            cidgate_api::Error::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            cidgate_api::Error::Http { status } => Self::Http { status },
            cidgate_api::Error::Transport(e) => match e.status() {
                Some(status) => Self::Http {
                    status: status.as_u16(),
                },
                None => Self::Transport {
                    message: e.to_string(),
                },
            },
            cidgate_api::Error::Deserialization { message, .. } => Self::Integrity { message },
            other @ (cidgate_api::Error::InvalidUrl(_) | cidgate_api::Error::Client(_)) => {
                Self::Transport {
                    message: other.to_string(),
                }
            }
        }
    }
}

/// Outcome of a single observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success,
    Failure { reason: FailureKind },
}

/// One observation of one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub gateway_id: GatewayId,
    pub source: SampleSource,
    pub outcome: ProbeOutcome,
    /// Request start to response headers; absent when no response arrived.
    pub latency_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub cors: bool,
    pub range: bool,
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(gateway_id: GatewayId, source: SampleSource, latency_ms: u64) -> Self {
        Self {
            gateway_id,
            source,
            outcome: ProbeOutcome::Success,
            latency_ms: Some(latency_ms),
            http_status: None,
            cors: false,
            range: false,
            observed_at: Utc::now(),
        }
    }

    pub fn failure(gateway_id: GatewayId, source: SampleSource, reason: FailureKind) -> Self {
        let http_status = match reason {
            FailureKind::Http { status } => Some(status),
            _ => None,
        };
        Self {
            gateway_id,
            source,
            outcome: ProbeOutcome::Failure { reason },
            latency_ms: None,
            http_status,
            cors: false,
            range: false,
            observed_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_capabilities(mut self, cors: bool, range: bool) -> Self {
        self.cors = cors;
        self.range = range;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success)
    }

    pub fn failure_reason(&self) -> Option<&FailureKind> {
        match &self.outcome {
            ProbeOutcome::Success => None,
            ProbeOutcome::Failure { reason } => Some(reason),
        }
    }
}
