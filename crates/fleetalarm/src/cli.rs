//! Clap derive structures for the `fleetalarm` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetalarm -- live fleet alarm console
#[derive(Debug, Parser)]
#[command(
    name = "fleetalarm",
    version,
    about = "Watch, browse and acknowledge fleet alarms from the command line",
    long_about = "Follows the fleet alarm feed over a server-sent event stream,\n\
        falling back to polling while the stream is down, and keeps one\n\
        de-duplicated list of alarms across history, stream and polls.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "FLEETALARM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Alarm API root URL (overrides profile)
    #[arg(long, env = "FLEETALARM_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token (overrides profile, keyring and token_env)
    #[arg(long, env = "FLEETALARM_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETALARM_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "FLEETALARM_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "FLEETALARM_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// Follow the live alarm feed
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Show one page of historical alarms
    #[command(alias = "hist")]
    History(HistoryArgs),

    /// Acknowledge an alarm
    Ack(AlarmIdArgs),

    /// Resolve an alarm
    Resolve(AlarmIdArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Which new alarms to print
    #[arg(long, short = 'f', default_value = "all")]
    pub filter: WatchFilter,

    /// Follow a single vehicle instead of the whole fleet
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// History pages to load before following (overrides config)
    #[arg(long)]
    pub history_pages: Option<u32>,

    /// Disable the terminal bell
    #[arg(long)]
    pub no_sound: bool,

    /// Disable notification banners and log lines
    #[arg(long)]
    pub no_notify: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchFilter {
    /// Every alarm
    All,
    /// Alarms that arrived on a live channel
    Live,
    /// Alarms still awaiting an operator
    Active,
    /// Critical alarms only
    Critical,
}

// ── History ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Page number (1-based)
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Page size (defaults to history_page_size from config)
    #[arg(long, short = 'l')]
    pub size: Option<u32>,
}

// ── Ack / Resolve ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlarmIdArgs {
    /// Alarm id
    pub id: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration (tokens redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store a bearer token in the system keyring
    SetToken {
        /// Read the token from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
