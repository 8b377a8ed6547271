//! Shared configuration for the cidgate engine and CLI.
//!
//! TOML file + `CIDGATE_*` environment overrides, loaded with figment and
//! translated into `cidgate_core::EngineConfig`. Durations are written as
//! human-readable strings (`"10s"`, `"500ms"`, `"30days"`). The CLI adds
//! flag-aware wrappers on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cidgate_core::{
    CacheConfig, Cid, CleanupPolicy, DEFAULT_PUBLIC_LIST, EngineConfig, FetchConfig,
    HealthConfig, ProbeConfig, Region, SWEEP_CACHE_VERSION, ScoringWeights, TransportConfig,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Public gateway list URLs used by `gateways import`.
    #[serde(default = "default_public_lists")]
    pub public_lists: Vec<String>,

    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub probe: ProbeSection,

    #[serde(default)]
    pub scoring: ScoringSection,

    #[serde(default)]
    pub cleanup: CleanupSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub transport: TransportSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_lists: default_public_lists(),
            defaults: Defaults::default(),
            engine: EngineSection::default(),
            probe: ProbeSection::default(),
            scoring: ScoringSection::default(),
            cleanup: CleanupSection::default(),
            cache: CacheSection::default(),
            fetch: FetchSection::default(),
            transport: TransportSection::default(),
        }
    }
}

fn default_public_lists() -> Vec<String> {
    vec![DEFAULT_PUBLIC_LIST.to_owned()]
}

fn human(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub output: String,
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: "table".into(),
            color: "auto".into(),
        }
    }
}

/// `[engine]`: identity of this deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
    /// `CN` or `INTL`; gateways of this region get the scoring bonus.
    pub region: String,
    /// CID every probe requests.
    pub test_cid: String,
    /// Where health, sweep, and registry state live. Defaults to the
    /// platform data directory.
    pub state_dir: Option<PathBuf>,
    /// Health records older than this are rebuilt from scratch.
    pub health_ttl: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            region: engine.preferred_region.to_string(),
            test_cid: engine.probe.test_cid,
            state_dir: None,
            health_ttl: human(engine.health.ttl),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeSection {
    pub concurrency: usize,
    pub timeout: String,
    pub retries: u32,
    pub retry_delay: String,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        Self {
            concurrency: probe.concurrency,
            timeout: human(probe.timeout),
            retries: probe.retries,
            retry_delay: human(probe.retry_delay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringSection {
    pub base_score: i64,
    pub latency_penalty_per_second: i64,
    pub max_latency: String,
    pub success_bonus: i64,
    pub success_bonus_cap: i64,
    pub failure_penalty: i64,
    pub region_bonus: i64,
    pub unavailable_after: u32,
}

impl Default for ScoringSection {
    fn default() -> Self {
        let w = ScoringWeights::default();
        Self {
            base_score: w.base_score,
            latency_penalty_per_second: w.latency_penalty_per_second,
            max_latency: human(w.max_latency),
            success_bonus: w.success_bonus,
            success_bonus_cap: w.success_bonus_cap,
            failure_penalty: w.failure_penalty,
            region_bonus: w.region_bonus,
            unavailable_after: w.unavailable_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupSection {
    pub max_failures: u64,
    pub max_consecutive_failures: u32,
    pub max_idle_days: u32,
    pub min_score: i64,
    pub auto_delete: bool,
    /// `"0s"` disables the background cleanup task.
    pub interval: String,
}

impl Default for CleanupSection {
    fn default() -> Self {
        let p = CleanupPolicy::default();
        Self {
            max_failures: p.max_failures,
            max_consecutive_failures: p.max_consecutive_failures,
            max_idle_days: p.max_idle_days,
            min_score: p.min_score,
            auto_delete: p.auto_delete,
            interval: human(p.interval),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl: human(CacheConfig::default().ttl),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchSection {
    pub parallel_gateways: usize,
    pub metadata_timeout: String,
    pub download_timeout: String,
    /// Bytes; larger objects skip range verification.
    pub verify_size_ceiling: u64,
    pub range_probe_bytes: u64,
    pub mapping_ttl: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        let f = FetchConfig::default();
        Self {
            parallel_gateways: f.parallel_gateways,
            metadata_timeout: human(f.metadata_timeout),
            download_timeout: human(f.download_timeout),
            verify_size_ceiling: f.verify_size_ceiling,
            range_probe_bytes: f.range_probe_bytes,
            mapping_ttl: human(f.mapping_ttl),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSection {
    pub connect_timeout: String,
    pub max_redirects: usize,
    /// Accept invalid TLS certificates (self-hosted gateways only).
    pub insecure: bool,
}

impl Default for TransportSection {
    fn default() -> Self {
        let t = TransportConfig::default();
        Self {
            connect_timeout: human(t.connect_timeout),
            max_redirects: t.max_redirects,
            insecure: t.accept_invalid_certs,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "cidgate", "cidgate")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "cidgate", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for persisted engine state.
pub fn default_state_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "cidgate"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields the
/// defaults (still subject to `CIDGATE_*` overrides).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CIDGATE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::invalid(field, format!("'{raw}' is not a duration: {e}")))
}

fn positive_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let d = duration(field, raw)?;
    if d.is_zero() {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(d)
}

fn non_zero(field: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(value)
}

impl Config {
    /// Validate every section and build the engine's configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let preferred_region: Region = self.engine.region.parse().map_err(|_| {
            ConfigError::invalid(
                "engine.region",
                format!("expected 'CN' or 'INTL', got '{}'", self.engine.region),
            )
        })?;

        let test_cid = Cid::parse(&self.engine.test_cid)
            .map_err(|e| ConfigError::invalid("engine.test_cid", e.to_string()))?;

        for raw in &self.public_lists {
            let parsed = url::Url::parse(raw)
                .map_err(|e| ConfigError::invalid("public_lists", format!("'{raw}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "public_lists",
                    format!("'{raw}' must be an http(s) URL"),
                ));
            }
        }

        let probe = ProbeConfig {
            concurrency: non_zero("probe.concurrency", self.probe.concurrency)?,
            timeout: positive_duration("probe.timeout", &self.probe.timeout)?,
            retries: self.probe.retries,
            retry_delay: duration("probe.retry_delay", &self.probe.retry_delay)?,
            test_cid: test_cid.to_string(),
        };

        let s = &self.scoring;
        let scoring = ScoringWeights {
            base_score: s.base_score,
            latency_penalty_per_second: s.latency_penalty_per_second,
            max_latency: positive_duration("scoring.max_latency", &s.max_latency)?,
            success_bonus: s.success_bonus,
            success_bonus_cap: s.success_bonus_cap,
            failure_penalty: s.failure_penalty,
            region_bonus: s.region_bonus,
            unavailable_after: s.unavailable_after,
        };

        let c = &self.cleanup;
        let cleanup = CleanupPolicy {
            max_failures: c.max_failures,
            max_consecutive_failures: c.max_consecutive_failures,
            max_idle_days: c.max_idle_days,
            min_score: c.min_score,
            auto_delete: c.auto_delete,
            interval: duration("cleanup.interval", &c.interval)?,
        };

        let f = &self.fetch;
        if f.range_probe_bytes == 0 {
            return Err(ConfigError::invalid(
                "fetch.range_probe_bytes",
                "must be at least 1",
            ));
        }
        let fetch = FetchConfig {
            parallel_gateways: non_zero("fetch.parallel_gateways", f.parallel_gateways)?,
            metadata_timeout: positive_duration("fetch.metadata_timeout", &f.metadata_timeout)?,
            download_timeout: positive_duration("fetch.download_timeout", &f.download_timeout)?,
            verify_size_ceiling: f.verify_size_ceiling,
            range_probe_bytes: f.range_probe_bytes,
            mapping_ttl: positive_duration("fetch.mapping_ttl", &f.mapping_ttl)?,
        };

        let transport = TransportConfig {
            connect_timeout: positive_duration(
                "transport.connect_timeout",
                &self.transport.connect_timeout,
            )?,
            max_redirects: non_zero("transport.max_redirects", self.transport.max_redirects)?,
            accept_invalid_certs: self.transport.insecure,
            ..TransportConfig::default()
        };

        Ok(EngineConfig {
            preferred_region,
            probe,
            scoring,
            health: HealthConfig {
                ttl: positive_duration("engine.health_ttl", &self.engine.health_ttl)?,
            },
            cleanup,
            cache: CacheConfig {
                ttl: duration("cache.ttl", &self.cache.ttl)?,
                version: SWEEP_CACHE_VERSION,
            },
            fetch,
            transport,
            state_dir: Some(
                self.engine
                    .state_dir
                    .clone()
                    .unwrap_or_else(default_state_dir),
            ),
            public_lists: self.public_lists.clone(),
        })
    }
}
