use std::path::Path;
use std::sync::Arc;

use adapters::http::server::run_http_server;
use adapters::http::state::AppState;
use adapters::live::ndjson_feed::NdjsonLiveFeed;
use adapters::source::http_snapshot::HttpSnapshotSource;
use adapters::source::rest_store::RestStoreSource;
use application::aggregator::{AggregatorConfig, AlertAggregator};
use application::alert_source::DualSourceFetcher;
use application::retry::BackoffConfig;
use infrastructure::config::AgentConfig;
use infrastructure::constants::{GRACEFUL_SHUTDOWN_TIMEOUT, STORE_KEY_ENV};
use infrastructure::logging::init_logging;
use infrastructure::metrics::AgentMetrics;
use ports::primary::alert_feed_port::AlertFeedPort;
use ports::secondary::live_feed::LiveFeed;
use ports::secondary::metrics_port::MetricsPort;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Run the agent startup sequence and block until shutdown.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let mut config = AgentConfig::load(Path::new(&cli.config))?;
    if let Ok(key) = std::env::var(STORE_KEY_ENV) {
        config.apply_store_key(&key);
    }

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over config file
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    // Service root span: fields appear in every subsequent log entry
    let _root_span = tracing::span!(
        tracing::Level::INFO,
        "service",
        service.name = "alertscope",
        service.version = env!("CARGO_PKG_VERSION"),
    )
    .entered();

    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "alertscope agent starting"
    );

    // ── 3. Initialize metrics ───────────────────────────────────────
    let metrics = Arc::new(AgentMetrics::new());

    // ── 4. Build the aggregator ─────────────────────────────────────
    let aggregator = Arc::new(build_aggregator(&config, Arc::clone(&metrics))?);
    aggregator.start()?;

    // ── 5. Shutdown token ───────────────────────────────────────────
    let cancel_token = create_shutdown_token();

    // ── 6. Feed change logger ───────────────────────────────────────
    let feed_log_handle = spawn_feed_logger(&aggregator, cancel_token.clone());

    // ── 7. HTTP server ──────────────────────────────────────────────
    let state = Arc::new(
        AppState::new(
            Arc::clone(&aggregator) as Arc<dyn AlertFeedPort>,
            Arc::clone(&metrics),
        )
        .with_map_markers(config.feed.map_markers),
    );
    let http_bind = config.agent.bind_address.clone();
    let http_port = config.agent.http_port;
    let http_shutdown = cancel_token.clone();
    let http_cancel = cancel_token.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = run_http_server(
            state,
            &http_bind,
            http_port,
            http_shutdown.cancelled_owned(),
        )
        .await
        {
            tracing::error!(error = %e, "HTTP server failed");
            // Without the read API the agent has no purpose.
            http_cancel.cancel();
        }
    });

    // ── 8. Ready, wait for cancellation ─────────────────────────────
    info!("agent ready, waiting for shutdown signal");
    cancel_token.cancelled().await;

    // ── 9. Ordered shutdown sequence ────────────────────────────────
    info!("shutdown phase 1: stopping aggregator");
    aggregator.stop().await;

    info!("shutdown phase 2: draining HTTP connections");
    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, http_handle)
        .await
        .is_err()
    {
        warn!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
            "HTTP server did not drain in time"
        );
    }
    let _ = feed_log_handle.await;

    info!("agent stopped");
    Ok(())
}

/// Wire the configured sources and live channel into an aggregator.
/// The aggregator is returned unstarted.
pub fn build_aggregator(
    config: &AgentConfig,
    metrics: Arc<AgentMetrics>,
) -> anyhow::Result<AlertAggregator> {
    let metrics_port = metrics as Arc<dyn MetricsPort>;

    let primary_cfg = &config.sources.primary;
    let primary = HttpSnapshotSource::new(&primary_cfg.name, &primary_cfg.url)?;
    let mut fetcher = DualSourceFetcher::new(Arc::new(primary), Arc::clone(&metrics_port))
        .with_timeout(config.sources.fetch_timeout());

    if let Some(ref store_cfg) = config.sources.fallback {
        let store = RestStoreSource::new(
            &store_cfg.name,
            &store_cfg.base_url,
            &store_cfg.table,
            config.store_limit(),
            store_cfg.api_key.clone(),
        )?;
        fetcher = fetcher.with_fallback(Arc::new(store));
    }
    info!(
        sources = ?fetcher.source_names(),
        timeout_secs = config.sources.fetch_timeout().as_secs(),
        "snapshot sources configured"
    );

    let mut live_backoff = BackoffConfig::default();
    let live: Option<Arc<dyn LiveFeed>> = match config.live_channel() {
        Some(live_cfg) => {
            live_backoff = BackoffConfig {
                initial: live_cfg.backoff_initial(),
                max: live_cfg.backoff_max(),
            };
            let feed = NdjsonLiveFeed::new(
                &live_cfg.name,
                &live_cfg.url,
                live_cfg.table.clone(),
                config.live_api_key().map(str::to_string),
            )?;
            info!(channel = %live_cfg.name, "live update channel configured");
            Some(Arc::new(feed))
        }
        None => {
            info!("live update channel disabled");
            None
        }
    };

    let aggregator_config = AggregatorConfig {
        capacity: config.feed.capacity,
        refresh_interval: config.feed.refresh_interval(),
        live_backoff,
    };
    info!(
        capacity = aggregator_config.capacity,
        refresh_interval_secs = aggregator_config.refresh_interval.as_secs(),
        "aggregator configured"
    );

    Ok(AlertAggregator::new(
        fetcher,
        live,
        aggregator_config,
        metrics_port,
    ))
}

/// Log every published feed change until cancelled or the aggregator
/// closes its view channel.
fn spawn_feed_logger(aggregator: &AlertAggregator, cancel: CancellationToken) -> JoinHandle<()> {
    let mut views = aggregator.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let view = views.borrow_and_update().clone();
            match view.last_error {
                Some(ref e) => warn!(
                    state = %view.state,
                    version = view.version,
                    alert_count = view.alerts.len(),
                    error = %e,
                    "alert feed updated with error"
                ),
                None => info!(
                    state = %view.state,
                    version = view.version,
                    alert_count = view.alerts.len(),
                    source = view.source.as_deref().unwrap_or("-"),
                    "alert feed updated"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> AgentConfig {
        AgentConfig::from_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn builds_primary_only_aggregator() {
        let cfg = config("sources:\n  primary:\n    url: \"http://127.0.0.1:9/alerts\"\n");
        let aggregator = build_aggregator(&cfg, Arc::new(AgentMetrics::new())).unwrap();
        assert!(!aggregator.is_running());
        assert!(!aggregator.view().state.has_loaded());
    }

    #[tokio::test]
    async fn builds_with_fallback_and_live_channel() {
        let cfg = config(
            r#"
sources:
  primary:
    url: "http://127.0.0.1:9/alerts"
  fallback:
    base_url: "http://127.0.0.1:9"
    api_key: "secret"
live:
  url: "http://127.0.0.1:9/changes"
  backoff_initial_ms: 100
  backoff_max_secs: 2
feed:
  capacity: 50
"#,
        );
        let aggregator = build_aggregator(&cfg, Arc::new(AgentMetrics::new())).unwrap();
        aggregator.start().unwrap();
        assert!(aggregator.is_running());
        aggregator.stop().await;
        assert!(!aggregator.is_running());
    }

    #[tokio::test]
    async fn feed_logger_exits_on_cancel() {
        let cfg = config("sources:\n  primary:\n    url: \"http://127.0.0.1:9/alerts\"\n");
        let aggregator = build_aggregator(&cfg, Arc::new(AgentMetrics::new())).unwrap();
        let cancel = CancellationToken::new();
        let handle = spawn_feed_logger(&aggregator, cancel.clone());
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
