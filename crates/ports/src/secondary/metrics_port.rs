// Focused sub-traits for recording Prometheus metrics, grouped by concern.
//
// All methods take `&self` because the underlying implementation uses
// atomic operations (interior mutability via `prometheus-client`).
//
// Default implementations are no-ops, allowing test mocks to implement
// only the sub-traits relevant to the service under test.

// ── Snapshot source metrics ────────────────────────────────────────

pub trait SourceMetrics: Send + Sync {
    /// Record a snapshot fetch attempt against a source.
    /// Result values: "success", "error", "timeout".
    fn record_fetch(&self, _source: &str, _result: &str) {}

    /// Observe a snapshot fetch duration in seconds.
    fn observe_fetch_duration(&self, _source: &str, _duration_seconds: f64) {}

    /// Record records skipped because they could not be normalized.
    fn record_malformed(&self, _source: &str, _count: u64) {}
}

// ── Live channel metrics ───────────────────────────────────────────

pub trait LiveMetrics: Send + Sync {
    /// Record a live record by merge outcome
    /// ("inserted", "duplicate", "expired", "malformed").
    fn record_live_event(&self, _outcome: &str) {}

    /// Record a resubscription attempt after a channel failure.
    fn record_resubscribe(&self) {}

    /// Set whether a live subscription is currently open.
    fn set_live_connected(&self, _connected: bool) {}
}

// ── Aggregated feed metrics ────────────────────────────────────────

pub trait FeedMetrics: Send + Sync {
    /// Set the number of alerts currently retained.
    fn set_feed_size(&self, _size: u64) {}

    /// Record a refresh cycle outcome ("success", "error").
    fn record_refresh(&self, _result: &str) {}

    /// Record a detected and healed collection invariant violation.
    fn record_invariant_violation(&self) {}

    /// Record a published notification.
    fn record_notification(&self) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port composing all sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>`. The sub-traits provide default
/// no-op implementations so that test mocks only need to override the
/// methods they care about.
pub trait MetricsPort: SourceMetrics + LiveMetrics + FeedMetrics {}

/// Blanket implementation: any type implementing all sub-traits automatically
/// implements `MetricsPort`.
impl<T> MetricsPort for T where T: SourceMetrics + LiveMetrics + FeedMetrics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_port_is_object_safe() {
        // Compile-time check: MetricsPort must be usable as dyn trait.
        fn _check(port: &dyn MetricsPort) {
            port.record_fetch("primary", "success");
            port.observe_fetch_duration("primary", 0.25);
            port.record_malformed("fallback", 2);
            port.record_live_event("inserted");
            port.record_resubscribe();
            port.set_live_connected(true);
            port.set_feed_size(100);
            port.record_refresh("error");
            port.record_invariant_violation();
            port.record_notification();
        }
    }

    #[test]
    fn minimal_mock_compiles() {
        struct MinimalMock;
        impl SourceMetrics for MinimalMock {}
        impl LiveMetrics for MinimalMock {}
        impl FeedMetrics for MinimalMock {}

        let mock = MinimalMock;
        let port: &dyn MetricsPort = &mock;
        port.record_fetch("primary", "success"); // no-op
    }
}
