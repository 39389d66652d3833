use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::alert::entity::{Alert, AlertRecord, RawAlert};
use domain::alert::error::AlertError;
use domain::alert::feed::{AlertFeed, DEFAULT_CAPACITY, MergeOutcome};
use domain::alert::view::{FeedState, FeedView};
use ports::primary::alert_feed_port::AlertFeedPort;
use ports::secondary::live_feed::LiveFeed;
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::alert_source::{DualSourceFetcher, SnapshotBatch, normalize_record};
use crate::live_channel::LiveChannel;
use crate::retry::BackoffConfig;

/// Interval between periodic snapshot refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const COMMAND_BUFFER: usize = 32;
const NEW_ALERT_BUFFER: usize = 256;
const MIN_LIVE_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum number of retained alerts.
    pub capacity: usize,
    pub refresh_interval: Duration,
    pub live_backoff: BackoffConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            live_backoff: BackoffConfig::default(),
        }
    }
}

enum Command {
    Refresh(oneshot::Sender<Result<usize, AlertError>>),
}

enum Lifecycle {
    Idle(watch::Sender<FeedView>),
    Running {
        cancel: CancellationToken,
        commands: mpsc::Sender<Command>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Owner of the published alert collection.
///
/// All mutations (initial load, periodic refresh, live merges) run on one
/// task; consumers only ever see complete [`FeedView`] snapshots through a
/// `watch` channel. After [`stop`](Self::stop) returns, no further
/// notification is sent and the view channel is closed.
pub struct AlertAggregator {
    fetcher: Arc<DualSourceFetcher>,
    live: Option<Arc<dyn LiveFeed>>,
    config: AggregatorConfig,
    metrics: Arc<dyn MetricsPort>,
    view: watch::Receiver<FeedView>,
    new_alerts: broadcast::Sender<Alert>,
    lifecycle: Mutex<Lifecycle>,
}

impl AlertAggregator {
    pub fn new(
        fetcher: DualSourceFetcher,
        live: Option<Arc<dyn LiveFeed>>,
        config: AggregatorConfig,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        let (view_tx, view) = watch::channel(FeedView::default());
        let (new_alerts, _) = broadcast::channel(NEW_ALERT_BUFFER);
        Self {
            fetcher: Arc::new(fetcher),
            live,
            config,
            metrics,
            view,
            new_alerts,
            lifecycle: Mutex::new(Lifecycle::Idle(view_tx)),
        }
    }

    /// Begin loading: the first snapshot fetch and the live subscription
    /// start together. Calling `start` on a running aggregator is a no-op;
    /// a stopped aggregator cannot be restarted.
    pub fn start(&self) -> Result<(), AlertError> {
        let mut lifecycle = self.lock();
        let view_tx = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(view_tx) => view_tx,
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                return Ok(());
            }
            Lifecycle::Stopped => return Err(AlertError::AggregatorStopped),
        };

        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = Worker {
            fetcher: Arc::clone(&self.fetcher),
            live: self.live.clone(),
            live_backoff: self.config.live_backoff,
            refresh_interval: self.config.refresh_interval,
            metrics: Arc::clone(&self.metrics),
            view_tx,
            new_alerts: self.new_alerts.clone(),
            feed: AlertFeed::new(self.config.capacity),
            state: FeedState::Uninitialized,
            last_error: None,
            source: None,
            refreshed_at: None,
            pending_live: VecDeque::new(),
            waiters: Vec::new(),
        };
        let handle = tokio::spawn(worker.run(command_rx, cancel.clone()));

        *lifecycle = Lifecycle::Running {
            cancel,
            commands,
            handle,
        };

        tracing::info!(
            capacity = self.config.capacity,
            refresh_interval_secs = self.config.refresh_interval.as_secs(),
            sources = ?self.fetcher.source_names(),
            live = self.live.is_some(),
            "alert aggregator started"
        );
        Ok(())
    }

    /// Tear down: cancel the refresh timer, release the live subscription
    /// and wait for the update task to finish. Idempotent.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lock(), Lifecycle::Stopped);
        let Lifecycle::Running {
            cancel,
            commands,
            handle,
        } = previous
        else {
            return;
        };

        cancel.cancel();
        drop(commands);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "alert aggregator task failed");
        }
        tracing::info!("alert aggregator stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Running { .. })
    }

    /// Current published snapshot.
    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    /// Change notifications. Each carries the full collection.
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// One event per alert inserted by the live channel.
    pub fn subscribe_new_alerts(&self) -> broadcast::Receiver<Alert> {
        self.new_alerts.subscribe()
    }

    /// Force a snapshot refresh and wait for it. Joins a fetch already in
    /// flight instead of starting another.
    pub async fn refresh(&self) -> Result<usize, AlertError> {
        let commands = {
            let lifecycle = self.lock();
            match &*lifecycle {
                Lifecycle::Running { commands, .. } => commands.clone(),
                Lifecycle::Idle(_) | Lifecycle::Stopped => {
                    return Err(AlertError::AggregatorStopped);
                }
            }
        };

        let (reply, response) = oneshot::channel();
        commands
            .send(Command::Refresh(reply))
            .await
            .map_err(|_| AlertError::AggregatorStopped)?;
        response.await.unwrap_or(Err(AlertError::AggregatorStopped))
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AlertAggregator {
    fn drop(&mut self) {
        if let Lifecycle::Running { cancel, .. } = &*self.lock() {
            cancel.cancel();
        }
    }
}

impl AlertFeedPort for AlertAggregator {
    fn view(&self) -> FeedView {
        AlertAggregator::view(self)
    }

    fn subscribe(&self) -> watch::Receiver<FeedView> {
        AlertAggregator::subscribe(self)
    }

    fn subscribe_new_alerts(&self) -> broadcast::Receiver<Alert> {
        AlertAggregator::subscribe_new_alerts(self)
    }

    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<usize, AlertError>> + Send + '_>> {
        Box::pin(AlertAggregator::refresh(self))
    }
}

// ── Update task ─────────────────────────────────────────────────────

type FetchFuture = Pin<Box<dyn Future<Output = Result<SnapshotBatch, AlertError>> + Send>>;

enum Event {
    Shutdown,
    Fetched(Result<SnapshotBatch, AlertError>),
    Refresh(oneshot::Sender<Result<usize, AlertError>>),
    Live(Option<RawAlert>),
    Tick,
}

struct Worker {
    fetcher: Arc<DualSourceFetcher>,
    live: Option<Arc<dyn LiveFeed>>,
    live_backoff: BackoffConfig,
    refresh_interval: Duration,
    metrics: Arc<dyn MetricsPort>,
    view_tx: watch::Sender<FeedView>,
    new_alerts: broadcast::Sender<Alert>,
    feed: AlertFeed,
    state: FeedState,
    last_error: Option<AlertError>,
    source: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
    /// Live records that arrived before the first snapshot settled.
    pending_live: VecDeque<AlertRecord>,
    /// Manual refresh callers waiting on the fetch in flight.
    waiters: Vec<oneshot::Sender<Result<usize, AlertError>>>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let live_cancel = cancel.child_token();
        let (mut live_rx, live_task) = match self.live.clone() {
            Some(feed) => {
                let (tx, rx) = mpsc::channel(self.feed.capacity().max(MIN_LIVE_BUFFER));
                let channel = LiveChannel::new(feed, Arc::clone(&self.metrics))
                    .with_backoff(self.live_backoff);
                let task = tokio::spawn(channel.run(tx, live_cancel.clone()));
                (Some(rx), Some(task))
            }
            None => (None, None),
        };

        self.set_state_silently(FeedState::Loading);
        let mut in_flight: Option<FetchFuture> = Some(self.begin_fetch());

        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // skip the first immediate tick (initial load is in flight)

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => Event::Shutdown,
                result = next_fetch(&mut in_flight) => Event::Fetched(result),
                command = commands.recv() => match command {
                    Some(Command::Refresh(reply)) => Event::Refresh(reply),
                    None => Event::Shutdown,
                },
                raw = next_live(&mut live_rx) => Event::Live(raw),
                _ = ticker.tick() => Event::Tick,
            };

            match event {
                Event::Shutdown => break,
                Event::Fetched(result) => {
                    in_flight = None;
                    self.apply_snapshot(result);
                }
                Event::Refresh(reply) => {
                    self.waiters.push(reply);
                    if in_flight.is_none() {
                        tracing::debug!("manual alert refresh");
                        in_flight = Some(self.begin_refresh());
                    }
                }
                Event::Tick => {
                    if in_flight.is_none() {
                        tracing::debug!("periodic alert refresh");
                        in_flight = Some(self.begin_refresh());
                    }
                }
                Event::Live(Some(raw)) => self.apply_live(raw),
                Event::Live(None) => live_rx = None,
            }
        }

        live_cancel.cancel();
        drop(live_rx);
        if let Some(task) = live_task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "live channel task failed");
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(AlertError::AggregatorStopped));
        }
        tracing::debug!(retained = self.feed.len(), "alert aggregator loop exited");
    }

    fn begin_fetch(&self) -> FetchFuture {
        let fetcher = Arc::clone(&self.fetcher);
        Box::pin(async move { fetcher.fetch().await })
    }

    fn begin_refresh(&mut self) -> FetchFuture {
        if self.state == FeedState::Ready {
            self.set_state_silently(FeedState::Refreshing);
        }
        self.begin_fetch()
    }

    fn apply_snapshot(&mut self, result: Result<SnapshotBatch, AlertError>) {
        let first_load = !self.state.has_loaded();

        let outcome = match result {
            Ok(batch) => {
                let alerts: Vec<Alert> = batch.records.into_iter().map(Alert::enrich).collect();
                if let Err(e) = self.feed.replace(alerts) {
                    self.report_violation(&e);
                }
                self.metrics.record_refresh("success");
                tracing::info!(
                    source = %batch.source,
                    alert_count = self.feed.len(),
                    malformed = batch.malformed,
                    first_load,
                    "alert snapshot applied"
                );
                self.last_error = None;
                self.source = Some(batch.source);
                self.refreshed_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_refresh("error");
                if first_load {
                    tracing::warn!(error = %e, "initial alert snapshot failed");
                } else {
                    tracing::warn!(
                        error = %e,
                        retained = self.feed.len(),
                        "alert refresh failed, keeping current alerts"
                    );
                }
                self.last_error = Some(e.clone());
                Err(e)
            }
        };

        self.state = FeedState::Ready;
        while let Some(record) = self.pending_live.pop_front() {
            self.merge_live(record);
        }
        self.publish();

        let reply = outcome.map(|()| self.feed.len());
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(reply.clone());
        }
    }

    fn apply_live(&mut self, raw: RawAlert) {
        let Ok(record) = normalize_record("live", raw, Utc::now()) else {
            self.metrics.record_live_event("malformed");
            return;
        };

        if !self.state.has_loaded() {
            if self.pending_live.len() >= self.feed.capacity() {
                self.pending_live.pop_front();
            }
            self.pending_live.push_back(record);
            return;
        }

        if self.merge_live(record) {
            self.publish();
        }
    }

    /// Returns whether the collection changed.
    fn merge_live(&mut self, record: AlertRecord) -> bool {
        let alert = Alert::enrich(record);
        match self.feed.merge(alert.clone()) {
            Ok(MergeOutcome::Inserted) => {
                self.metrics.record_live_event(MergeOutcome::Inserted.as_str());
                tracing::debug!(
                    alert_id = %alert.id,
                    severity = %alert.severity,
                    "live alert merged"
                );
                let _ = self.new_alerts.send(alert);
                true
            }
            Ok(outcome) => {
                self.metrics.record_live_event(outcome.as_str());
                tracing::debug!(
                    alert_id = %alert.id,
                    outcome = outcome.as_str(),
                    "live alert not merged"
                );
                false
            }
            Err(e) => {
                self.report_violation(&e);
                true
            }
        }
    }

    fn report_violation(&self, error: &AlertError) {
        self.metrics.record_invariant_violation();
        tracing::error!(error = %error, "alert feed repaired after invariant violation");
    }

    fn set_state_silently(&mut self, state: FeedState) {
        self.state = state;
        self.view_tx.send_if_modified(|view| {
            view.state = state;
            false
        });
    }

    /// Publish the current collection. Notifies only when the alerts or the
    /// error flag changed, or when the first snapshot settled.
    fn publish(&mut self) {
        let alerts = self.feed.alerts();
        let state = self.state;
        let last_error = &self.last_error;
        let source = &self.source;
        let refreshed_at = self.refreshed_at;

        let notified = self.view_tx.send_if_modified(|view| {
            let settled = !view.state.has_loaded() && state.has_loaded();
            let changed =
                settled || view.last_error != *last_error || *view.alerts != *alerts;

            view.state = state;
            view.source.clone_from(source);
            view.refreshed_at = refreshed_at;
            if changed {
                view.alerts = Arc::from(alerts);
                view.last_error.clone_from(last_error);
                view.version += 1;
            }
            changed
        });

        if notified {
            self.metrics.record_notification();
            self.metrics
                .set_feed_size(u64::try_from(self.feed.len()).unwrap_or(u64::MAX));
        }
    }
}

async fn next_fetch(in_flight: &mut Option<FetchFuture>) -> Result<SnapshotBatch, AlertError> {
    match in_flight {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

async fn next_live(live_rx: &mut Option<mpsc::Receiver<RawAlert>>) -> Option<RawAlert> {
    match live_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::common::entity::Severity;
    use ports::test_utils::{
        NoopMetrics, RecordingMetrics, ScriptedLiveFeed, StaticSource, raw_alert,
    };

    const T1: &str = "2025-01-01T10:00:00Z";
    const T2: &str = "2025-01-01T10:00:05Z";

    struct Harness {
        aggregator: AlertAggregator,
        primary: Arc<StaticSource>,
        fallback: Arc<StaticSource>,
        live: Arc<ScriptedLiveFeed>,
        metrics: Arc<RecordingMetrics>,
    }

    fn harness(primary: StaticSource, fallback: StaticSource, config: AggregatorConfig) -> Harness {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let live = Arc::new(ScriptedLiveFeed::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let fetcher = DualSourceFetcher::new(primary.clone(), metrics.clone())
            .with_fallback(fallback.clone())
            .with_timeout(Duration::from_secs(5));
        let aggregator =
            AlertAggregator::new(fetcher, Some(live.clone()), config, metrics.clone());
        Harness {
            aggregator,
            primary,
            fallback,
            live,
            metrics,
        }
    }

    fn config(capacity: usize) -> AggregatorConfig {
        AggregatorConfig {
            capacity,
            refresh_interval: Duration::from_secs(30),
            live_backoff: BackoffConfig {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(100),
            },
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn wait_view(
        rx: &mut watch::Receiver<FeedView>,
        predicate: impl FnMut(&FeedView) -> bool,
    ) -> FeedView {
        tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate))
            .await
            .expect("view not reached in time")
            .expect("view channel closed")
            .clone()
    }

    fn ids(view: &FeedView) -> Vec<&str> {
        view.alerts.iter().map(|a| a.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_then_live_insert_then_duplicate() {
        let h = harness(
            StaticSource::ok(
                "primary",
                vec![raw_alert(1, "ssh-bruteforce", "10.0.0.1", T1)],
            ),
            StaticSource::failing("fallback", "unused"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();

        let view = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        assert_eq!(ids(&view), vec!["1"]);
        assert_eq!(view.alerts[0].severity, Severity::Critical);
        assert_eq!(view.source.as_deref(), Some("primary"));
        assert!(view.last_error.is_none());

        eventually(|| h.live.is_connected()).await;
        assert!(h.live.push(raw_alert(2, "port-scan", "10.0.0.2", T2)));
        let view = wait_view(&mut rx, |v| v.len() == 2).await;
        assert_eq!(ids(&view), vec!["2", "1"]);
        assert_eq!(view.alerts[0].severity, Severity::High);
        let version = view.version;

        assert!(h.live.push(raw_alert(2, "port-scan", "10.0.0.2", T2)));
        eventually(|| h.metrics.count("live:duplicate") == 1).await;
        let after = h.aggregator.view();
        assert_eq!(after.len(), 2);
        assert_eq!(after.version, version);
        assert_eq!(after.alerts, view.alerts);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_serves_when_primary_fails() {
        let h = harness(
            StaticSource::failing("primary", "HTTP 500"),
            StaticSource::ok("fallback", vec![raw_alert(7, "dos flood", "10.1.1.1", T1)]),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();

        let view = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        assert_eq!(ids(&view), vec!["7"]);
        assert_eq!(view.alerts[0].severity, Severity::Ddos);
        assert_eq!(view.source.as_deref(), Some("fallback"));
        assert!(view.last_error.is_none());
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.fallback.calls(), 1);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_settles_ready_and_empty() {
        let h = harness(
            StaticSource::failing("primary", "down"),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();

        let view = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        assert!(view.is_empty());
        assert!(matches!(
            view.last_error,
            Some(AlertError::SourceUnavailable(_))
        ));
        assert_eq!(view.version, 1);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_collection() {
        let h = harness(
            StaticSource::ok(
                "primary",
                vec![
                    raw_alert(1, "ssh", "10.0.0.1", T1),
                    raw_alert(2, "scan", "10.0.0.2", T2),
                ],
            ),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        let before = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;

        h.primary.set_failure("down");
        let after = wait_view(&mut rx, |v| v.last_error.is_some()).await;
        assert_eq!(after.alerts, before.alerts);
        assert_eq!(after.state, FeedState::Ready);
        assert_eq!(h.metrics.count("refresh:error"), 1);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_replaces_collection() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;

        h.primary
            .set_records(vec![raw_alert(5, "suspicious login", "10.0.0.5", T2)]);
        let view = wait_view(&mut rx, |v| v.get(&"5".into()).is_some()).await;
        assert_eq!(ids(&view), vec!["5"]);
        assert_eq!(view.alerts[0].severity, Severity::Medium);
        assert_eq!(h.primary.calls(), 2);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn error_clears_after_successful_refresh() {
        let h = harness(
            StaticSource::failing("primary", "down"),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.last_error.is_some()).await;

        h.primary
            .set_records(vec![raw_alert(1, "ssh", "10.0.0.1", T1)]);
        assert_eq!(h.aggregator.refresh().await, Ok(1));
        let view = h.aggregator.view();
        assert!(view.last_error.is_none());
        assert_eq!(view.len(), 1);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_refresh_does_not_notify() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        let first = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;

        assert_eq!(h.aggregator.refresh().await, Ok(1));
        let view = h.aggregator.view();
        assert_eq!(view.version, first.version);
        assert_eq!(view.state, FeedState::Ready);
        assert!(!rx.has_changed().unwrap());

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_fetch() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;

        h.primary.set_delay(Some(Duration::from_secs(1)));
        let (a, b) = tokio::join!(h.aggregator.refresh(), h.aggregator.refresh());
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(h.primary.calls(), 2);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refreshing_state_is_visible_while_fetching() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;

        h.primary.set_delay(Some(Duration::from_secs(2)));
        let refresh = h.aggregator.refresh();
        tokio::pin!(refresh);
        let polled = tokio::time::timeout(Duration::from_millis(500), &mut refresh).await;
        assert!(polled.is_err());
        let view = h.aggregator.view();
        assert_eq!(view.state, FeedState::Refreshing);
        assert!(view.is_loading());
        assert_eq!(view.len(), 1);

        assert_eq!(refresh.await, Ok(1));
        assert_eq!(h.aggregator.view().state, FeedState::Ready);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn live_records_during_loading_are_merged_after_snapshot() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)])
                .with_delay(Duration::from_secs(2)),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();

        eventually(|| h.live.is_connected()).await;
        assert!(h.aggregator.view().is_loading());
        assert!(h.live.push(raw_alert(2, "port-scan", "10.0.0.2", T2)));
        assert!(h.live.push(raw_alert(1, "ssh", "10.0.0.1", T1)));

        let view = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        assert_eq!(ids(&view), vec!["2", "1"]);
        assert_eq!(view.version, 1);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retention_bound_applies_to_live_merges() {
        let h = harness(
            StaticSource::ok("primary", vec![]),
            StaticSource::failing("fallback", "down"),
            config(3),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        eventually(|| h.live.is_connected()).await;

        for i in 0..5 {
            let ts = format!("2025-01-01T10:00:0{i}Z");
            assert!(h.live.push(raw_alert(i, "scan", "10.0.0.9", &ts)));
        }
        let view = wait_view(&mut rx, |v| v.get(&"4".into()).is_some()).await;
        assert_eq!(ids(&view), vec!["4", "3", "2"]);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_alerts_are_broadcast() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut alerts = h.aggregator.subscribe_new_alerts();
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        eventually(|| h.live.is_connected()).await;

        assert!(h.live.push(raw_alert(1, "ssh", "10.0.0.1", T1)));
        assert!(h.live.push(raw_alert(9, "exploit attempt", "10.0.0.9", T2)));
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.id.as_str(), "9");
        assert_eq!(alert.severity, Severity::High);

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_live_record_is_skipped() {
        let h = harness(
            StaticSource::ok("primary", vec![]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        eventually(|| h.live.is_connected()).await;

        assert!(h.live.push(RawAlert::default()));
        eventually(|| h.metrics.count("live:malformed") == 1).await;
        assert!(h.aggregator.view().is_empty());

        h.aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_everything() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        let mut rx = h.aggregator.subscribe();
        h.aggregator.start().unwrap();
        wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        eventually(|| h.live.is_connected()).await;

        h.aggregator.stop().await;
        assert!(!h.aggregator.is_running());
        assert!(!h.live.is_connected());
        assert!(!h.live.push(raw_alert(2, "scan", "10.0.0.2", T2)));
        assert!(rx.changed().await.is_err());
        assert_eq!(
            h.aggregator.refresh().await,
            Err(AlertError::AggregatorStopped)
        );

        let calls = h.primary.calls();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.primary.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_transitions() {
        let h = harness(
            StaticSource::ok("primary", vec![]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        assert_eq!(h.aggregator.view().state, FeedState::Uninitialized);
        assert_eq!(
            h.aggregator.refresh().await,
            Err(AlertError::AggregatorStopped)
        );

        h.aggregator.start().unwrap();
        h.aggregator.start().unwrap();
        assert!(h.aggregator.is_running());

        h.aggregator.stop().await;
        h.aggregator.stop().await;
        assert_eq!(h.aggregator.start(), Err(AlertError::AggregatorStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn works_without_live_feed() {
        let fetcher = DualSourceFetcher::new(
            Arc::new(StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)])),
            Arc::new(NoopMetrics),
        );
        let aggregator =
            AlertAggregator::new(fetcher, None, AggregatorConfig::default(), Arc::new(NoopMetrics));
        let mut rx = aggregator.subscribe();
        aggregator.start().unwrap();
        let view = wait_view(&mut rx, |v| v.state == FeedState::Ready).await;
        assert_eq!(view.len(), 1);
        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn serves_through_feed_port() {
        let h = harness(
            StaticSource::ok("primary", vec![raw_alert(1, "ssh", "10.0.0.1", T1)]),
            StaticSource::failing("fallback", "down"),
            config(100),
        );
        h.aggregator.start().unwrap();
        let port: &dyn AlertFeedPort = &h.aggregator;
        assert_eq!(port.refresh().await, Ok(1));
        assert_eq!(port.view().len(), 1);
        h.aggregator.stop().await;
    }
}
