//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::Select;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_region() -> Result<String, CliError> {
    let choices = &["CN (mainland China gateways first)", "INTL (international gateways first)"];
    let selection = Select::new()
        .with_prompt("Preferred region")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    Ok(if selection == 0 { "CN" } else { "INTL" }.into())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &mut GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = config::active_config_path(global);
            if path.exists() && !force {
                return Err(CliError::Conflict {
                    resource_type: "config file".into(),
                    identifier: path.display().to_string(),
                });
            }

            let mut cfg = Config::default();
            if let Some(region) = global.region {
                cfg.engine.region = region.as_config_str().into();
            } else if !global.yes && std::io::stdin().is_terminal() {
                cfg.engine.region = prompt_region()?;
            }
            if let Some(dir) = &global.state_dir {
                cfg.engine.state_dir = Some(dir.clone());
            }

            config::save_config_to(&cfg, &path)?;
            output::print_status(
                &format!("Configuration written to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            config::apply_defaults(global, &cfg);
            if let Err(e) = cfg.to_engine_config() {
                tracing::warn!(error = %e, "configuration will be rejected by the engine");
            }
            let out = output::render_single(
                &global.format(),
                &cfg,
                |c| {
                    toml::to_string_pretty(c)
                        .unwrap_or_else(|e| format!("failed to render config: {e}"))
                },
                |_| config::active_config_path(global).display().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &config::active_config_path(global).display().to_string(),
                global.quiet,
            );
            Ok(())
        }
    }
}
