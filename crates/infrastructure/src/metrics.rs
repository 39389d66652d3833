use ports::secondary::metrics_port::{FeedMetrics, LiveMetrics, SourceMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets_range};
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    pub source: String,
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SourceLabels {
    pub source: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BuildLabels {
    pub version: String,
}

// ── Agent metrics registry ──────────────────────────────────────────

/// Prometheus metrics registry for the agent.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. The registry itself is NOT Clone;
/// wrap in `Arc` for multi-task sharing.
pub struct AgentMetrics {
    registry: Registry,
    pub snapshot_fetches_total: Family<FetchLabels, Counter>,
    pub snapshot_fetch_duration: Family<SourceLabels, Histogram>,
    pub malformed_records_total: Family<SourceLabels, Counter>,
    pub live_events_total: Family<OutcomeLabels, Counter>,
    pub live_resubscribes_total: Counter,
    pub live_connected: Gauge,
    pub feed_size: Gauge,
    pub refreshes_total: Family<ResultLabels, Counter>,
    pub invariant_violations_total: Counter,
    pub notifications_total: Counter,
}

impl AgentMetrics {
    /// Create a new metrics registry with all metrics registered under
    /// the `alertscope` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("alertscope");

        let build_info = Family::<BuildLabels, Gauge>::default();
        registry.register(
            "build_info",
            "Agent build information (always 1)",
            build_info.clone(),
        );
        build_info
            .get_or_create(&BuildLabels {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .set(1);

        let snapshot_fetches_total = Family::<FetchLabels, Counter>::default();
        registry.register(
            "snapshot_fetches",
            "Snapshot fetch attempts by source and result",
            snapshot_fetches_total.clone(),
        );

        let snapshot_fetch_duration =
            Family::<SourceLabels, Histogram>::new_with_constructor(|| {
                // Exponential buckets from 10ms to 30s (12 buckets)
                Histogram::new(exponential_buckets_range(0.01, 30.0, 12))
            });
        registry.register(
            "snapshot_fetch_duration_seconds",
            "Snapshot fetch latency in seconds",
            snapshot_fetch_duration.clone(),
        );

        let malformed_records_total = Family::<SourceLabels, Counter>::default();
        registry.register(
            "malformed_records",
            "Records skipped because they could not be normalized",
            malformed_records_total.clone(),
        );

        let live_events_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "live_events",
            "Live records by merge outcome",
            live_events_total.clone(),
        );

        let live_resubscribes_total = Counter::default();
        registry.register(
            "live_resubscribes",
            "Live channel resubscriptions after a failure",
            live_resubscribes_total.clone(),
        );

        let live_connected = Gauge::default();
        registry.register(
            "live_connected",
            "Live subscription status (1=open, 0=closed)",
            live_connected.clone(),
        );

        let feed_size = Gauge::default();
        registry.register(
            "feed_size",
            "Alerts currently retained in the published feed",
            feed_size.clone(),
        );

        let refreshes_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "refreshes",
            "Snapshot refresh cycles by result",
            refreshes_total.clone(),
        );

        let invariant_violations_total = Counter::default();
        registry.register(
            "invariant_violations",
            "Feed invariant violations detected and healed",
            invariant_violations_total.clone(),
        );

        let notifications_total = Counter::default();
        registry.register(
            "notifications",
            "Feed change notifications published to observers",
            notifications_total.clone(),
        );

        Self {
            registry,
            snapshot_fetches_total,
            snapshot_fetch_duration,
            malformed_records_total,
            live_events_total,
            live_resubscribes_total,
            live_connected,
            feed_size,
            refreshes_total,
            invariant_violations_total,
            notifications_total,
        }
    }

    /// Encode all metrics in `OpenMetrics` text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        buffer
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sub-trait implementations ──────────────────────────────────────

impl SourceMetrics for AgentMetrics {
    fn record_fetch(&self, source: &str, result: &str) {
        self.snapshot_fetches_total
            .get_or_create(&FetchLabels {
                source: source.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    fn observe_fetch_duration(&self, source: &str, duration_seconds: f64) {
        self.snapshot_fetch_duration
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .observe(duration_seconds);
    }

    fn record_malformed(&self, source: &str, count: u64) {
        self.malformed_records_total
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .inc_by(count);
    }
}

impl LiveMetrics for AgentMetrics {
    fn record_live_event(&self, outcome: &str) {
        self.live_events_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    fn record_resubscribe(&self) {
        self.live_resubscribes_total.inc();
    }

    fn set_live_connected(&self, connected: bool) {
        self.live_connected.set(i64::from(connected));
    }
}

impl FeedMetrics for AgentMetrics {
    fn set_feed_size(&self, size: u64) {
        self.feed_size.set(size.try_into().unwrap_or(i64::MAX));
    }

    fn record_refresh(&self, result: &str) {
        self.refreshes_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }

    fn record_invariant_violation(&self) {
        self.invariant_violations_total.inc();
    }

    fn record_notification(&self) {
        self.notifications_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::secondary::metrics_port::MetricsPort;
    use std::sync::Arc;

    #[test]
    fn new_registry_encodes() {
        let metrics = AgentMetrics::new();
        let encoded = metrics.encode();
        assert!(encoded.contains("alertscope_build_info"));
        assert!(encoded.contains("alertscope_feed_size"));
        assert!(encoded.ends_with("# EOF\n"));
    }

    #[test]
    fn usable_as_metrics_port() {
        let port: Arc<dyn MetricsPort> = Arc::new(AgentMetrics::new());
        port.record_fetch("primary", "success");
        port.record_live_event("inserted");
        port.set_feed_size(3);
    }

    #[test]
    fn fetch_counter_labels() {
        let metrics = AgentMetrics::new();
        metrics.record_fetch("primary", "error");
        metrics.record_fetch("store", "success");

        let encoded = metrics.encode();
        assert!(encoded.contains("alertscope_snapshot_fetches_total"));
        assert!(encoded.contains("source=\"primary\""));
        assert!(encoded.contains("result=\"error\""));
        assert!(encoded.contains("source=\"store\""));
    }

    #[test]
    fn fetch_duration_histogram() {
        let metrics = AgentMetrics::new();
        metrics.observe_fetch_duration("primary", 0.2);

        let encoded = metrics.encode();
        assert!(encoded.contains("alertscope_snapshot_fetch_duration_seconds_bucket"));
    }

    #[test]
    fn malformed_counter_adds_batch() {
        let metrics = AgentMetrics::new();
        metrics.record_malformed("primary", 3);
        assert_eq!(
            metrics
                .malformed_records_total
                .get_or_create(&SourceLabels {
                    source: "primary".to_string()
                })
                .get(),
            3
        );
    }

    #[test]
    fn live_metrics() {
        let metrics = AgentMetrics::new();
        metrics.record_live_event("duplicate");
        metrics.record_resubscribe();
        metrics.record_resubscribe();
        metrics.set_live_connected(true);

        assert_eq!(metrics.live_resubscribes_total.get(), 2);
        assert_eq!(metrics.live_connected.get(), 1);
        metrics.set_live_connected(false);
        assert_eq!(metrics.live_connected.get(), 0);

        let encoded = metrics.encode();
        assert!(encoded.contains("outcome=\"duplicate\""));
    }

    #[test]
    fn feed_metrics() {
        let metrics = AgentMetrics::new();
        metrics.set_feed_size(100);
        metrics.record_refresh("success");
        metrics.record_invariant_violation();
        metrics.record_notification();

        assert_eq!(metrics.feed_size.get(), 100);
        assert_eq!(metrics.invariant_violations_total.get(), 1);
        assert_eq!(metrics.notifications_total.get(), 1);
        assert!(metrics.encode().contains("result=\"success\""));
    }
}
