//! Sweep and ranking command handlers.

use chrono::Utc;
use tabled::Tabled;

use cidgate_core::{Engine, RankedGateway};

use crate::cli::{GlobalOpts, SweepArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct RankRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Score")]
    score: i64,
    #[tabled(rename = "Latency")]
    latency: String,
}

impl RankRow {
    fn new(r: &RankedGateway, color: bool) -> Self {
        Self {
            rank: r.rank,
            id: r.gateway.id.to_string(),
            name: r.gateway.name.clone(),
            region: r.gateway.region.to_string(),
            status: output::status_label(r.status, color),
            score: r.score,
            latency: output::latency_label(r.latency_ms),
        }
    }
}

fn print_ranking(ranked: &[RankedGateway], global: &GlobalOpts) {
    let color = output::should_color(&global.color_mode());
    let out = output::render_list(
        &global.format(),
        ranked,
        |r| RankRow::new(r, color),
        |r| r.gateway.id.to_string(),
    );
    output::print_output(&out, global.quiet);
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle_sweep(
    engine: &Engine,
    args: &SweepArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pb = util::spinner("Probing gateways", global.quiet);

    let sweep = engine.refresh_sweep(args.force);
    tokio::pin!(sweep);
    let report = tokio::select! {
        report = &mut sweep => report,
        _ = tokio::signal::ctrl_c() => {
            pb.set_message("Cancelling sweep");
            engine.cancel_sweep().await;
            sweep.await
        }
    };
    pb.finish_and_clear();
    let report = report?;

    print_ranking(&report.ranked, global);

    if report.from_cache {
        output::print_status(
            &format!(
                "Cached sweep from {} ago (use --force to re-probe)",
                util::age(Utc::now() - report.swept_at)
            ),
            global.quiet,
        );
    } else {
        output::print_status(
            &format!(
                "Probed {}/{} gateways, {} responded",
                report.probed, report.requested, report.succeeded
            ),
            global.quiet,
        );
    }

    if report.cancelled {
        output::print_status("Sweep cancelled; partial results were not cached", global.quiet);
        return Err(CliError::Cancelled);
    }
    Ok(())
}

/// Ranking from recorded health only; nothing is probed.
pub fn handle_rank(engine: &Engine, global: &GlobalOpts) {
    print_ranking(&engine.ranked(), global);
}
