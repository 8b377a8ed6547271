//! Cleanup command handlers.

use tabled::Tabled;

use cidgate_core::{CleanupCandidate, CleanupRun, Engine, GatewayId};

use crate::cli::{CleanupArgs, CleanupCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

impl From<&CleanupCandidate> for CandidateRow {
    fn from(c: &CleanupCandidate) -> Self {
        Self {
            id: c.gateway_id.to_string(),
            name: c.name.clone().unwrap_or_else(|| "-".into()),
            origin: c.origin.map_or_else(|| "-".into(), |o| o.to_string()),
            reasons: c
                .reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

fn run_detail(run: &CleanupRun) -> String {
    let mut lines = vec![
        format!("Expired records:   {}", run.expired_records),
        format!("Expired sessions:  {}", run.expired_mappings),
        format!("Marked:            {}", run.marked.len()),
    ];
    for c in &run.marked {
        lines.push(format!("  {}", c.gateway_id));
    }
    lines.push(format!("Removed:           {}", run.removed.len()));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    engine: &Engine,
    args: CleanupArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        CleanupCommand::Report => {
            let marked = engine.cleanup_report();
            let out = output::render_list(
                &global.format(),
                &marked,
                |c| CandidateRow::from(c),
                |c| c.gateway_id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CleanupCommand::Apply { ids, all } => {
            let ids: Vec<GatewayId> = if all {
                engine
                    .cleanup_report()
                    .into_iter()
                    .map(|c| c.gateway_id)
                    .collect()
            } else {
                ids.into_iter().map(GatewayId::new).collect()
            };
            if ids.is_empty() {
                output::print_status("Nothing is marked for cleanup", global.quiet);
                return Ok(());
            }

            if !util::confirm(
                "cleanup apply",
                &format!("Remove {} gateway(s) and their health history?", ids.len()),
                global.yes,
            )? {
                return Ok(());
            }

            let outcome = engine.apply_cleanup(&ids).await;
            for gw in &outcome.removed {
                output::print_status(&format!("Removed {}", gw.id), global.quiet);
            }
            for id in &outcome.skipped {
                output::print_status(
                    &format!("Skipped {id}: not marked for cleanup"),
                    global.quiet,
                );
            }
            Ok(())
        }

        CleanupCommand::Run => {
            let run = engine.run_cleanup().await;
            let out = output::render_single(&global.format(), &run, run_detail, |r| {
                r.removed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
