//! Fetch and URL resolution command handlers.

use std::io::Write;

use bytesize::ByteSize;

use cidgate_core::{Engine, FetchReport, GatewayFailure, ResolvedUrl};

use crate::cli::{FetchArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

fn fallback_note(failures: &[GatewayFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let lines: Vec<String> = failures.iter().map(|f| format!("  skipped {f}")).collect();
    Some(lines.join("\n"))
}

fn report_detail(r: &FetchReport) -> String {
    let mut lines = vec![
        format!("CID:       {}", r.cid),
        format!("Gateway:   {} ({})", r.gateway.name, r.gateway.id),
        format!("URL:       {}", r.url),
        format!("Size:      {}", ByteSize::b(r.size)),
        format!("Type:      {}", r.content_type.as_deref().unwrap_or("-")),
        format!("Latency:   {}ms", r.latency_ms),
    ];
    if let Some(note) = fallback_note(&r.failures) {
        lines.push(format!("Fallbacks:\n{note}"));
    }
    lines.join("\n")
}

fn resolved_detail(r: &ResolvedUrl) -> String {
    let mut lines = vec![
        format!("URL:       {}", r.url),
        format!("Gateway:   {} ({})", r.gateway.name, r.gateway.id),
        format!("Size:      {}", r.size.map_or_else(|| "-".into(), |s| ByteSize::b(s).to_string())),
        format!("Type:      {}", r.content_type.as_deref().unwrap_or("-")),
    ];
    if let Some(note) = fallback_note(&r.failures) {
        lines.push(format!("Fallbacks:\n{note}"));
    }
    lines.join("\n")
}

/// Drive `fut` to completion, cancelling in-flight fetches on Ctrl-C.
async fn cancellable<T>(
    engine: &Engine,
    fut: impl Future<Output = Result<T, cidgate_core::CoreError>>,
) -> Result<T, CliError> {
    tokio::pin!(fut);
    let result = tokio::select! {
        result = &mut fut => result,
        _ = tokio::signal::ctrl_c() => {
            engine.cancel_fetches().await;
            fut.await
        }
    };
    Ok(result?)
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle_fetch(
    engine: &Engine,
    args: FetchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pb = util::spinner(format!("Fetching {}", args.cid), global.quiet);

    if let Some(dest) = args.dest {
        let result = cancellable(engine, engine.smart_fetch_to_file(&args.cid, dest)).await;
        pb.finish_and_clear();
        let file = result?;
        let out = output::render_single(&global.format(), &file.report, report_detail, |_| {
            file.path.display().to_string()
        });
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let result = cancellable(engine, engine.smart_fetch(&args.cid, args.filename)).await;
    pb.finish_and_clear();
    let content = result?;

    // Content goes to stdout untouched; the report goes to stderr.
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content.bytes)?;
    stdout.flush()?;
    output::print_status(
        &format!(
            "Fetched {} from {}",
            ByteSize::b(content.report.size),
            content.report.gateway.name
        ),
        global.quiet,
    );
    Ok(())
}

pub async fn handle_url(engine: &Engine, cid: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let pb = util::spinner(format!("Resolving {cid}"), global.quiet);
    let result = cancellable(engine, engine.resolve_url(cid)).await;
    pb.finish_and_clear();
    let resolved = result?;

    let out = output::render_single(&global.format(), &resolved, resolved_detail, |r| {
        r.url.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
