//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use cidgate_config::ConfigError;
use cidgate_core::{CoreError, GatewayFailure};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const EXHAUSTED: i32 = 9;
    pub const CANCELLED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Gateways ─────────────────────────────────────────────────────

    #[error("Could not reach {target}")]
    #[diagnostic(
        code(cidgate::connection_failed),
        help("Check your network connection, then retry with -v for details.\n{reason}")
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("{target} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(cidgate::timeout),
        help("Raise probe.timeout or fetch.download_timeout in the config file.")
    )]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Every gateway failed for {cid}")]
    #[diagnostic(
        code(cidgate::exhausted),
        help("Attempts:\n{attempts}\nRun: cidgate sweep --force to refresh gateway health")
    )]
    Exhausted { cid: String, attempts: String },

    #[error("Gateway {gateway} served content that failed verification")]
    #[diagnostic(code(cidgate::integrity), help("{reason}"))]
    Integrity { gateway: String, reason: String },

    #[error("Operation cancelled")]
    #[diagnostic(code(cidgate::cancelled))]
    Cancelled,

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(cidgate::not_found),
        help("Run: cidgate {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(cidgate::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    #[error("Gateway '{id}' is built in and cannot be removed directly")]
    #[diagnostic(
        code(cidgate::not_custom),
        help("Built-in gateways are only removed by: cidgate cleanup apply {id}")
    )]
    NotCustom { id: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cidgate::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(cidgate::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Configuration & state ────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(cidgate::config),
        help("Inspect the effective configuration with: cidgate config show")
    )]
    Config(#[from] ConfigError),

    #[error("Failed to persist {what}: {message}")]
    #[diagnostic(code(cidgate::state), help("Check permissions on the state directory."))]
    Persistence { what: String, message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(cidgate::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Exhausted { .. } | Self::Integrity { .. } => exit_code::EXHAUSTED,
            Self::Cancelled => exit_code::CANCELLED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::NotCustom { .. }
            | Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

fn attempts(errors: &[GatewayFailure]) -> String {
    errors
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProbeTimeout {
                gateway,
                timeout_ms,
            } => Self::Timeout {
                target: gateway.to_string(),
                timeout_ms,
            },

            CoreError::ProbeTransport { gateway, reason } => Self::ConnectionFailed {
                target: gateway.to_string(),
                reason,
            },

            CoreError::ProbeHttp { gateway, status } => Self::ConnectionFailed {
                target: gateway.to_string(),
                reason: format!("HTTP {status}"),
            },

            CoreError::GatewayList { url, reason } => Self::ConnectionFailed {
                target: url,
                reason,
            },

            CoreError::IntegrityMismatch { gateway, reason } => Self::Integrity {
                gateway: gateway.to_string(),
                reason,
            },

            CoreError::AllCandidatesExhausted { cid, errors } => Self::Exhausted {
                cid,
                attempts: if errors.is_empty() {
                    "  (no gateways in the catalog)".into()
                } else {
                    attempts(&errors)
                },
            },

            CoreError::Cancelled => Self::Cancelled,

            CoreError::ConfigInvalid { message } => Self::Validation {
                field: "gateway".into(),
                reason: message,
            },

            CoreError::InvalidCid { cid, reason } => Self::Validation {
                field: "cid".into(),
                reason: format!("'{cid}': {reason}"),
            },

            CoreError::GatewayNotFound { id } => Self::NotFound {
                resource_type: "gateway".into(),
                identifier: id.to_string(),
                list_command: "gateways list".into(),
            },

            CoreError::GatewayExists { id } => Self::Conflict {
                resource_type: "gateway".into(),
                identifier: id.to_string(),
            },

            CoreError::NotCustom { id } => Self::NotCustom { id: id.to_string() },

            CoreError::Persistence { what, message } => Self::Persistence { what, message },

            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}
