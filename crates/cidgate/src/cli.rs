//! Clap derive structures for the `cidgate` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Also compiled by `build.rs` for man page generation, so it may only
//! depend on clap, clap_complete, and std.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cidgate -- pick the IPFS gateway that actually answers
#[derive(Debug, Parser)]
#[command(
    name = "cidgate",
    version,
    about = "Probe, rank, and fetch through IPFS HTTP gateways",
    long_about = "Tracks the health of public and custom IPFS HTTP gateways, ranks them\n\
        by latency and reliability, and downloads content by CID with automatic\n\
        fallback from one gateway to the next.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "CIDGATE_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for persisted health and registry state
    #[arg(long, env = "CIDGATE_STATE_DIR", global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Preferred region (overrides config)
    #[arg(long, short = 'r', global = true)]
    pub region: Option<RegionArg>,

    /// Output format (defaults to the config's `defaults.output`)
    #[arg(long, short = 'o', env = "CIDGATE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

impl GlobalOpts {
    pub fn format(&self) -> OutputFormat {
        self.output.clone().unwrap_or(OutputFormat::Table)
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color.clone().unwrap_or(ColorMode::Auto)
    }
}

// ── Output, Color & Region Enums ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegionArg {
    /// Mainland China gateways
    #[value(name = "cn", alias = "CN")]
    Cn,
    /// International gateways
    #[value(name = "intl", alias = "INTL")]
    Intl,
}

impl RegionArg {
    pub fn as_config_str(self) -> &'static str {
        match self {
            Self::Cn => "CN",
            Self::Intl => "INTL",
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the gateway catalog
    #[command(alias = "gw", alias = "g")]
    Gateways(GatewaysArgs),

    /// Probe every gateway and print the ranking
    Sweep(SweepArgs),

    /// Print the ranking from recorded health, without probing
    Rank,

    /// Download content by CID with automatic gateway fallback
    Fetch(FetchArgs),

    /// Resolve the best verified direct URL for a CID
    Url {
        /// Content identifier (CIDv0 or CIDv1)
        cid: String,
    },

    /// Review and remove chronically failing gateways
    Cleanup(CleanupArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  GATEWAYS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct GatewaysArgs {
    #[command(subcommand)]
    pub command: GatewaysCommand,
}

#[derive(Debug, Subcommand)]
pub enum GatewaysCommand {
    /// List every gateway with its recorded health
    #[command(alias = "ls")]
    List,

    /// Add a custom gateway
    Add {
        /// Display name
        #[arg(long, short = 'n')]
        name: String,

        /// URL template: `https://host/ipfs/{cid}`, `https://host/ipfs/:hash`,
        /// a bare `https://host`, or a subdomain `https://{cid}.ipfs.host`
        #[arg(long, short = 'u')]
        url: String,

        /// Region (defaults to intl)
        #[arg(long)]
        gateway_region: Option<RegionArg>,

        /// Tie-break priority, lower first
        #[arg(long)]
        priority: Option<u32>,

        /// Icon shown next to the name
        #[arg(long)]
        icon: Option<String>,
    },

    /// Remove a custom gateway
    #[command(alias = "rm")]
    Remove {
        /// Gateway id (see `gateways list`)
        id: String,
    },

    /// Import gateways from the configured public lists
    Import,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SWEEP / FETCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Probe even when a fresh cached sweep exists
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Content identifier (CIDv0 or CIDv1)
    pub cid: String,

    /// Write to this file (streamed via `<PATH>.part`) instead of stdout
    #[arg(long, short = 'd', value_name = "PATH")]
    pub dest: Option<PathBuf>,

    /// Filename hint sent to gateways
    #[arg(long)]
    pub filename: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CLEANUP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CleanupArgs {
    #[command(subcommand)]
    pub command: CleanupCommand,
}

#[derive(Debug, Subcommand)]
pub enum CleanupCommand {
    /// List gateways marked for cleanup and why
    Report,

    /// Remove marked gateways
    Apply {
        /// Gateway ids to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,

        /// Remove every marked gateway
        #[arg(long, short = 'a')]
        all: bool,
    },

    /// Run one full pass: expire stale records, mark, auto-delete if enabled
    Run,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file populated with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration (file + environment)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
