use clap::{Args, Parser, Subcommand, ValueEnum};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::{DEFAULT_CONFIG_PATH, DEFAULT_HTTP_PORT};

#[derive(Parser, Debug)]
#[command(
    name = "alertscope",
    about = "alertscope security alert aggregator",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "ALERTSCOPE_CONFIG")]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (default, production) or text (development)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Table,
    /// Raw JSON from the API
    Json,
}

/// Connection parameters for reaching a running agent.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Agent API host
    #[arg(long, default_value = "127.0.0.1", env = "ALERTSCOPE_HOST")]
    pub host: String,

    /// Agent API port
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "ALERTSCOPE_PORT")]
    pub port: u16,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent (default when no subcommand is given)
    Run,

    /// Display version and build information
    Version,

    /// Load and validate the config file, then print it with secrets masked
    CheckConfig,

    /// Check agent liveness and readiness
    Health {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Display Prometheus metrics
    Metrics {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Query the aggregated alert feed of a running agent
    Alerts(DomainArgs<AlertsCommand>),
}

/// Generic domain args: connection + subcommand.
#[derive(Args, Debug)]
pub struct DomainArgs<T: Subcommand> {
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[command(subcommand)]
    pub command: T,
}

// ── Alerts ──────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum AlertsCommand {
    /// List retained alerts, newest first
    List {
        /// Exact severity (low, medium, high, ddos, critical)
        #[arg(long)]
        severity: Option<String>,
        /// Minimum severity
        #[arg(long)]
        min_severity: Option<String>,
        /// Substring match over event and source IP
        #[arg(long)]
        search: Option<String>,
        /// Sort order: newest or oldest
        #[arg(long)]
        order: Option<String>,
        /// Maximum entries
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one alert by ID
    Get {
        /// Alert ID
        id: String,
    },
    /// Per-severity counts and feed status
    Stats,
    /// Force a snapshot refresh
    Refresh,
    /// Threat map markers for the newest alerts
    Map {
        /// Number of markers
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
