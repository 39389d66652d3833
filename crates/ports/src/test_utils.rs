use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use domain::alert::entity::{Alert, RawAlert, RawAlertId};
use domain::alert::error::AlertError;
use domain::alert::view::FeedView;
use tokio::sync::{broadcast, watch};

use crate::primary::alert_feed_port::AlertFeedPort;
use crate::secondary::live_feed::{LiveFeed, LivePublisher, LiveSubscription};
use crate::secondary::metrics_port::{FeedMetrics, LiveMetrics, SourceMetrics};
use crate::secondary::snapshot_source::SnapshotSource;

/// No-op implementation of all metrics sub-traits for use in tests.
pub struct NoopMetrics;

impl SourceMetrics for NoopMetrics {}
impl LiveMetrics for NoopMetrics {}
impl FeedMetrics for NoopMetrics {}

/// Metrics double that records every call as a `name:label` string.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SourceMetrics for RecordingMetrics {
    fn record_fetch(&self, source: &str, result: &str) {
        self.push(format!("fetch:{source}:{result}"));
    }

    fn record_malformed(&self, source: &str, count: u64) {
        self.push(format!("malformed:{source}:{count}"));
    }
}

impl LiveMetrics for RecordingMetrics {
    fn record_live_event(&self, outcome: &str) {
        self.push(format!("live:{outcome}"));
    }

    fn record_resubscribe(&self) {
        self.push("resubscribe".to_string());
    }
}

impl FeedMetrics for RecordingMetrics {
    fn record_refresh(&self, result: &str) {
        self.push(format!("refresh:{result}"));
    }

    fn record_invariant_violation(&self) {
        self.push("invariant_violation".to_string());
    }
}

/// Build a raw record the way the store delivers it.
pub fn raw_alert(id: i64, event: &str, source_ip: &str, timestamp: &str) -> RawAlert {
    RawAlert {
        id: Some(RawAlertId::Number(id)),
        event: Some(event.to_string()),
        source_ip: Some(source_ip.to_string()),
        timestamp: Some(timestamp.to_string()),
    }
}

// ── Snapshot source double ─────────────────────────────────────────

/// Snapshot source returning a configurable response, optionally after a
/// delay. Counts how often it was called.
pub struct StaticSource {
    name: String,
    response: Mutex<Result<Vec<RawAlert>, AlertError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn ok(name: &str, records: Vec<RawAlert>) -> Self {
        Self::with_response(name, Ok(records))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_response(
            name,
            Err(AlertError::SourceUnavailable(message.to_string())),
        )
    }

    fn with_response(name: &str, response: Result<Vec<RawAlert>, AlertError>) -> Self {
        Self {
            name: name.to_string(),
            response: Mutex::new(response),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_records(&self, records: Vec<RawAlert>) {
        *self.response.lock().unwrap() = Ok(records);
    }

    pub fn set_failure(&self, message: &str) {
        *self.response.lock().unwrap() = Err(AlertError::SourceUnavailable(message.to_string()));
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_snapshot<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAlert>, AlertError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        let response = self.response.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

// ── Live feed double ───────────────────────────────────────────────

/// Live feed driven by the test. Each `subscribe` replaces the current
/// publisher; `push` delivers to whichever subscription is open.
#[derive(Default)]
pub struct ScriptedLiveFeed {
    current: Mutex<Option<LivePublisher>>,
    refuse: Mutex<bool>,
    subscriptions: AtomicUsize,
}

impl ScriptedLiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a record. Returns `false` when nobody is subscribed.
    pub fn push(&self, record: RawAlert) -> bool {
        self.send(Ok(record))
    }

    /// Deliver a per-message error.
    pub fn push_malformed(&self, message: &str) -> bool {
        self.send(Err(AlertError::MalformedRecord(message.to_string())))
    }

    /// Break the current subscription with a channel error.
    pub fn fail(&self, message: &str) {
        let publisher = self.current.lock().unwrap().take();
        if let Some(publisher) = publisher {
            let _ = publisher.try_send(Err(AlertError::ChannelError(message.to_string())));
        }
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// True when a subscription is open and its consumer is still listening.
    pub fn is_connected(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| !p.is_cancelled())
    }

    fn send(&self, item: Result<RawAlert, AlertError>) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| p.try_send(item))
    }
}

impl LiveFeed for ScriptedLiveFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    fn subscribe<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<LiveSubscription, AlertError>> + Send + 'a>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let result = if *self.refuse.lock().unwrap() {
            Err(AlertError::ChannelError("subscription refused".to_string()))
        } else {
            let (publisher, subscription) = LiveSubscription::channel(64);
            *self.current.lock().unwrap() = Some(publisher);
            Ok(subscription)
        };
        Box::pin(async move { result })
    }
}

// ── Feed port double ───────────────────────────────────────────────

/// Alert feed port serving a fixed view, for exercising consumers.
pub struct FixedFeedPort {
    view: watch::Sender<FeedView>,
    new_alerts: broadcast::Sender<Alert>,
    refresh_result: Mutex<Result<usize, AlertError>>,
}

impl FixedFeedPort {
    pub fn new(view: FeedView) -> Self {
        let (view, _) = watch::channel(view);
        let (new_alerts, _) = broadcast::channel(16);
        Self {
            view,
            new_alerts,
            refresh_result: Mutex::new(Ok(0)),
        }
    }

    pub fn set_refresh_result(&self, result: Result<usize, AlertError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    /// Broadcast an alert to `subscribe_new_alerts` receivers.
    pub fn announce(&self, alert: Alert) {
        let _ = self.new_alerts.send(alert);
    }
}

impl AlertFeedPort for FixedFeedPort {
    fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.subscribe()
    }

    fn subscribe_new_alerts(&self) -> broadcast::Receiver<Alert> {
        self.new_alerts.subscribe()
    }

    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<usize, AlertError>> + Send + '_>> {
        let result = self.refresh_result.lock().unwrap().clone();
        Box::pin(async move { result })
    }
}
