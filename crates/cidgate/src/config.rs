//! CLI-specific configuration: re-exports the shared config crate and adds
//! `GlobalOpts`-aware overrides on top.

use clap::ValueEnum;

pub use cidgate_config::*;

use cidgate_core::EngineConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Load the config from `--config` (or the canonical path) + environment.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(cfg)
}

/// Path `config init` writes to and `config path` prints.
pub fn active_config_path(global: &GlobalOpts) -> std::path::PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Fill unset presentation flags from the config's `[defaults]`.
pub fn apply_defaults(global: &mut GlobalOpts, cfg: &Config) {
    if global.output.is_none() {
        global.output = OutputFormat::from_str(&cfg.defaults.output, true).ok();
    }
    if global.color.is_none() {
        global.color = ColorMode::from_str(&cfg.defaults.color, true).ok();
    }
}

/// Build an `EngineConfig` from the config plus CLI flag overrides.
pub fn engine_config(cfg: &Config, global: &GlobalOpts) -> Result<EngineConfig, CliError> {
    let mut cfg = cfg.clone();
    if let Some(region) = global.region {
        cfg.engine.region = region.as_config_str().into();
    }
    if let Some(dir) = &global.state_dir {
        cfg.engine.state_dir = Some(dir.clone());
    }
    Ok(cfg.to_engine_config()?)
}
