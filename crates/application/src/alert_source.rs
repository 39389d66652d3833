use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use domain::alert::entity::{AlertRecord, RawAlert};
use domain::alert::error::AlertError;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::snapshot_source::SnapshotSource;

/// Per-path fetch timeout applied when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated records from one successful snapshot fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBatch {
    /// Name of the source that answered.
    pub source: String,
    pub records: Vec<AlertRecord>,
    /// Records skipped because they could not be validated.
    pub malformed: usize,
}

/// Alert source adapter: queries the primary source and falls through to
/// the fallback on any failure (error, timeout).
///
/// Source errors never escape as anything but
/// [`AlertError::SourceUnavailable`], and only when every path failed.
pub struct DualSourceFetcher {
    primary: Arc<dyn SnapshotSource>,
    fallback: Option<Arc<dyn SnapshotSource>>,
    timeout: Duration,
    metrics: Arc<dyn MetricsPort>,
}

impl DualSourceFetcher {
    pub fn new(primary: Arc<dyn SnapshotSource>, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            primary,
            fallback: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
            metrics,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn SnapshotSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Names of the configured paths, primary first.
    pub fn source_names(&self) -> Vec<&str> {
        std::iter::once(self.primary.name())
            .chain(self.fallback.as_ref().map(|f| f.name()))
            .collect()
    }

    /// Fetch a snapshot, primary first.
    pub async fn fetch(&self) -> Result<SnapshotBatch, AlertError> {
        let primary_error = match self.fetch_from(self.primary.as_ref()).await {
            Ok(batch) => return Ok(batch),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback.as_deref() else {
            return Err(AlertError::SourceUnavailable(format!(
                "{}: {}",
                self.primary.name(),
                failure_detail(&primary_error)
            )));
        };

        tracing::info!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_error,
            "primary alert source failed, using fallback"
        );

        self.fetch_from(fallback).await.map_err(|fallback_error| {
            AlertError::SourceUnavailable(format!(
                "{}: {}; {}: {}",
                self.primary.name(),
                failure_detail(&primary_error),
                fallback.name(),
                failure_detail(&fallback_error)
            ))
        })
    }

    async fn fetch_from(&self, source: &dyn SnapshotSource) -> Result<SnapshotBatch, AlertError> {
        let name = source.name();
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, source.fetch_snapshot()).await;
        self.metrics
            .observe_fetch_duration(name, started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(raw)) => {
                self.metrics.record_fetch(name, "success");
                let batch = normalize_batch(name, raw, Utc::now());
                if batch.malformed > 0 {
                    self.metrics
                        .record_malformed(name, u64::try_from(batch.malformed).unwrap_or(u64::MAX));
                }
                tracing::debug!(
                    source = name,
                    alert_count = batch.records.len(),
                    malformed = batch.malformed,
                    "alert snapshot fetched"
                );
                Ok(batch)
            }
            Ok(Err(e)) => {
                self.metrics.record_fetch(name, "error");
                tracing::warn!(source = name, error = %e, "alert snapshot fetch failed");
                Err(e)
            }
            Err(_elapsed) => {
                self.metrics.record_fetch(name, "timeout");
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(source = name, timeout_ms, "alert snapshot fetch timed out");
                Err(AlertError::SourceUnavailable(format!(
                    "timed out after {timeout_ms}ms"
                )))
            }
        }
    }
}

/// Validate raw records. Bad records are logged, counted and skipped.
pub fn normalize_batch(
    source: &str,
    raw: Vec<RawAlert>,
    received_at: DateTime<Utc>,
) -> SnapshotBatch {
    let mut records = Vec::with_capacity(raw.len());
    let mut malformed = 0;

    for item in raw {
        match normalize_record(source, item, received_at) {
            Ok(record) => records.push(record),
            Err(_) => malformed += 1,
        }
    }

    SnapshotBatch {
        source: source.to_string(),
        records,
        malformed,
    }
}

/// Validate one raw record, logging defaulted fields and rejections.
pub fn normalize_record(
    source: &str,
    raw: RawAlert,
    received_at: DateTime<Utc>,
) -> Result<AlertRecord, AlertError> {
    let defaulted = raw.defaulted_fields();
    match AlertRecord::from_raw(raw, received_at) {
        Ok(record) => {
            if !defaulted.is_empty() {
                tracing::debug!(
                    source,
                    alert_id = %record.id,
                    fields = ?defaulted,
                    "alert record fields defaulted"
                );
            }
            Ok(record)
        }
        Err(e) => {
            tracing::warn!(source, error = %e, "skipping malformed alert record");
            Err(e)
        }
    }
}

fn failure_detail(error: &AlertError) -> String {
    match error {
        AlertError::SourceUnavailable(detail) => detail.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::alert::entity::RawAlertId;
    use ports::test_utils::{NoopMetrics, RecordingMetrics, StaticSource, raw_alert};

    fn ssh(id: i64) -> RawAlert {
        raw_alert(id, "ssh-bruteforce", "10.0.0.1", "2025-01-01T00:00:00Z")
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = Arc::new(StaticSource::ok("primary", vec![ssh(1)]));
        let fallback = Arc::new(StaticSource::ok("fallback", vec![ssh(2)]));
        let fetcher = DualSourceFetcher::new(primary.clone(), Arc::new(NoopMetrics))
            .with_fallback(fallback.clone());

        let batch = fetcher.fetch().await.unwrap();
        assert_eq!(batch.source, "primary");
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].id.as_str(), "1");
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback() {
        let primary = Arc::new(StaticSource::failing("primary", "HTTP 502"));
        let fallback = Arc::new(StaticSource::ok("fallback", vec![ssh(2)]));
        let fetcher =
            DualSourceFetcher::new(primary, Arc::new(NoopMetrics)).with_fallback(fallback);

        let batch = fetcher.fetch().await.unwrap();
        assert_eq!(batch.source, "fallback");
        assert_eq!(batch.records[0].id.as_str(), "2");
    }

    #[tokio::test]
    async fn both_failing_is_source_unavailable() {
        let fetcher = DualSourceFetcher::new(
            Arc::new(StaticSource::failing("primary", "connection refused")),
            Arc::new(NoopMetrics),
        )
        .with_fallback(Arc::new(StaticSource::failing("fallback", "HTTP 401")));

        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(
            err,
            AlertError::SourceUnavailable(
                "primary: connection refused; fallback: HTTP 401".to_string()
            )
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn primary_only_failure() {
        let fetcher = DualSourceFetcher::new(
            Arc::new(StaticSource::failing("primary", "down")),
            Arc::new(NoopMetrics),
        );
        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err, AlertError::SourceUnavailable("primary: down".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_primary_times_out_into_fallback() {
        let primary =
            Arc::new(StaticSource::ok("primary", vec![ssh(1)]).with_delay(Duration::from_secs(60)));
        let fallback = Arc::new(StaticSource::ok("fallback", vec![ssh(2)]));
        let metrics = Arc::new(RecordingMetrics::default());
        let fetcher = DualSourceFetcher::new(primary, metrics.clone())
            .with_fallback(fallback)
            .with_timeout(Duration::from_secs(5));

        let batch = fetcher.fetch().await.unwrap();
        assert_eq!(batch.source, "fallback");
        assert_eq!(metrics.count("fetch:primary:timeout"), 1);
        assert_eq!(metrics.count("fetch:fallback:success"), 1);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_and_counted() {
        let no_id = RawAlert {
            event: Some("ssh".to_string()),
            ..RawAlert::default()
        };
        let blank_id = RawAlert {
            id: Some(RawAlertId::Text("  ".to_string())),
            ..RawAlert::default()
        };
        let metrics = Arc::new(RecordingMetrics::default());
        let fetcher = DualSourceFetcher::new(
            Arc::new(StaticSource::ok("primary", vec![ssh(1), no_id, blank_id])),
            metrics.clone(),
        );

        let batch = fetcher.fetch().await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.malformed, 2);
        assert_eq!(metrics.count("malformed:primary:2"), 1);
    }

    #[test]
    fn normalize_defaults_missing_fields() {
        let received_at = Utc::now();
        let raw = RawAlert {
            id: Some(RawAlertId::Number(9)),
            ..RawAlert::default()
        };
        let batch = normalize_batch("primary", vec![raw], received_at);
        let record = &batch.records[0];
        assert_eq!(record.event, "Unknown Event");
        assert_eq!(record.source_ip, "Unknown IP");
        assert_eq!(record.timestamp, received_at);
    }

    #[test]
    fn source_names_lists_paths() {
        let fetcher = DualSourceFetcher::new(
            Arc::new(StaticSource::ok("http", vec![])),
            Arc::new(NoopMetrics),
        )
        .with_fallback(Arc::new(StaticSource::ok("rest", vec![])));
        assert_eq!(fetcher.source_names(), vec!["http", "rest"]);
        assert_eq!(fetcher.timeout(), DEFAULT_FETCH_TIMEOUT);
    }
}
