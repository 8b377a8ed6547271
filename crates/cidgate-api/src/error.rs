use thiserror::Error;

/// Top-level error type for the `cidgate-api` crate.
///
/// Covers every way a single request against a single gateway can fail.
/// `cidgate-core` folds these into per-gateway failure records and never
/// surfaces them raw to the operator.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Request did not complete within its deadline.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Building the underlying HTTP client failed.
    #[error("HTTP client error: {0}")]
    Client(String),

    // ── Gateway responses ───────────────────────────────────────────
    /// Gateway answered with a non-success status.
    #[error("Gateway returned HTTP {status}")]
    Http { status: u16 },

    /// Gateway list payload could not be decoded.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Classify a `reqwest::Error`, lifting timeouts into [`Error::Timeout`].
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_ms }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(err)
        }
    }

    /// Returns `true` if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// HTTP status code, when the failure came from a gateway response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if retrying the same gateway might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_connect() || e.is_request() || e.is_body(),
            Self::Http { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
