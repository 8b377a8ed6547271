//! Gateway catalog command handlers.

use tabled::Tabled;

use cidgate_core::{CustomGateway, Engine, GatewayConfig, GatewayEntry, GatewayId};

use crate::cli::{GatewaysArgs, GatewaysCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct GatewayRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Prio")]
    priority: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Last OK")]
    last_success: String,
}

impl GatewayRow {
    fn new(entry: &GatewayEntry, color: bool) -> Self {
        let gw = &entry.gateway;
        let health = entry.health.as_ref();
        Self {
            id: gw.id.to_string(),
            name: match &gw.icon {
                Some(icon) => format!("{icon} {}", gw.name),
                None => gw.name.clone(),
            },
            region: gw.region.to_string(),
            origin: gw.origin.to_string(),
            priority: gw.priority,
            status: output::status_label(health.map(|h| h.status).unwrap_or_default(), color),
            score: health.map_or_else(|| "-".into(), |h| h.score.to_string()),
            latency: output::latency_label(health.and_then(|h| h.latency_ms)),
            last_success: output::time_label(health.and_then(|h| h.last_success)),
        }
    }
}

fn detail(gw: &GatewayConfig) -> String {
    [
        format!("ID:        {}", gw.id),
        format!("Name:      {}", gw.name),
        format!("Template:  {}", gw.url_template),
        format!("Region:    {}", gw.region),
        format!("Priority:  {}", gw.priority),
        format!("Origin:    {}", gw.origin),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    engine: &Engine,
    args: GatewaysArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        GatewaysCommand::List => {
            let color = output::should_color(&global.color_mode());
            let entries = engine.list_gateways();
            let out = output::render_list(
                &global.format(),
                &entries,
                |e| GatewayRow::new(e, color),
                |e| e.gateway.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GatewaysCommand::Add {
            name,
            url,
            gateway_region,
            priority,
            icon,
        } => {
            let gw = engine
                .add_custom_gateway(CustomGateway {
                    name,
                    url,
                    icon,
                    region: gateway_region.map(util::region),
                    priority,
                })
                .await?;
            let out = output::render_single(&global.format(), &gw, detail, |g| g.id.to_string());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GatewaysCommand::Remove { id } => {
            if !util::confirm(
                "gateways remove",
                &format!("Remove gateway '{id}' and its health history?"),
                global.yes,
            )? {
                return Ok(());
            }
            let removed = engine.remove_custom_gateway(&GatewayId::new(id)).await?;
            output::print_status(&format!("Removed {}", removed.id), global.quiet);
            Ok(())
        }

        GatewaysCommand::Import => {
            let pb = util::spinner("Fetching public gateway lists", global.quiet);
            let result = engine.refresh_public_gateways().await;
            pb.finish_and_clear();
            let added = result?;
            output::print_status(
                &format!(
                    "Imported {added} new gateway{}",
                    if added == 1 { "" } else { "s" }
                ),
                global.quiet,
            );
            Ok(())
        }
    }
}
