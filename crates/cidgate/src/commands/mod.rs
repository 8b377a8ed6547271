//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod cleanup;
pub mod config_cmd;
pub mod fetch;
pub mod gateways;
pub mod sweep;
pub mod util;

use cidgate_core::Engine;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Gateways(args) => gateways::handle(engine, args, global).await,
        Command::Sweep(args) => sweep::handle_sweep(engine, &args, global).await,
        Command::Rank => {
            sweep::handle_rank(engine, global);
            Ok(())
        }
        Command::Fetch(args) => fetch::handle_fetch(engine, args, global).await,
        Command::Url { cid } => fetch::handle_url(engine, &cid, global).await,
        Command::Cleanup(args) => cleanup::handle(engine, args, global).await,
        // Config and Completions are handled before the engine is opened
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command dispatched without an engine".into(),
        )),
    }
}
