use std::time::Duration;

// ── Network defaults ───────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/alertscope/config.yaml";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

// ── Sources ────────────────────────────────────────────────────────

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORE_TABLE: &str = "alerts";

/// Environment variable holding the direct-store API key. Takes precedence
/// over keys written in the config file.
pub const STORE_KEY_ENV: &str = "ALERTSCOPE_STORE_KEY";

// ── Live channel ───────────────────────────────────────────────────

pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;

// ── Feed ───────────────────────────────────────────────────────────

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const MAX_FEED_CAPACITY: usize = 10_000;

// ── Timeouts ───────────────────────────────────────────────────────

pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
