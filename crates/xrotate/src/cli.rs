//! Clap derive structures for the `xrotate` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// xrotate -- keep a 3x-ui panel's outbounds pointed at clean CDN IPs
#[derive(Debug, Parser)]
#[command(
    name = "xrotate",
    version,
    about = "Rotate scanned CDN IPs into a 3x-ui panel's xray outbounds",
    long_about = "Scans for clean CDN edge IPs, expands outbound templates over them,\n\
        and replaces the panel's managed outbounds (tags starting with the\n\
        configured prefix) while leaving every other outbound untouched.",
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
    /// Config file (default: platform config dir)
    #[arg(long, env = "XROTATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Panel base URL, including any secret web path (overrides XUI_URL)
    #[arg(long, short = 'u', global = true)]
    pub panel_url: Option<String>,

    /// Panel username (overrides XUI_USERNAME)
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Tag prefix marking managed outbounds (overrides OUTBOUND_PREFIX)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan, generate and update once
    Run,

    /// Run scan, generate and update every N minutes
    #[command(alias = "run-cron")]
    Cron(CronArgs),

    /// Scan IP ranges and write the IP-quality CSV
    Scan,

    /// Expand templates over scanned IPs into the generated-outbound file
    #[command(alias = "gen")]
    Generate,

    /// Push the generated outbounds to the panel and restart xray
    Update(UpdateArgs),

    /// List the panel's live outbounds
    #[command(alias = "ls")]
    Outbounds,

    /// Inspect configuration and store credentials
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CronArgs {
    /// Minutes between cycles (overrides CRON_MINUTES)
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u64).range(1..))]
    pub minutes: Option<u64>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Show the merged outbound list without writing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Store the panel password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
