use std::sync::Arc;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;
use ports::secondary::live_feed::{LiveFeed, LiveSubscription};
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::retry::{Backoff, BackoffConfig};

/// Keeps a live subscription open and forwards its records to one
/// consumer, resubscribing with backoff whenever the channel breaks.
pub struct LiveChannel {
    feed: Arc<dyn LiveFeed>,
    backoff: BackoffConfig,
    metrics: Arc<dyn MetricsPort>,
}

enum SubscriptionEnd {
    Cancelled,
    ConsumerGone,
    Broken(AlertError),
}

impl LiveChannel {
    pub fn new(feed: Arc<dyn LiveFeed>, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            feed,
            backoff: BackoffConfig::default(),
            metrics,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run until `cancel` fires or the consumer drops `tx`.
    ///
    /// The subscription is closed before this returns, so nothing is
    /// forwarded afterwards.
    pub async fn run(self, tx: mpsc::Sender<RawAlert>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.backoff);
        let feed_name = self.feed.name().to_string();

        loop {
            let subscribed = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.feed.subscribe() => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    tracing::info!(feed = %feed_name, "live subscription opened");
                    self.metrics.set_live_connected(true);
                    let end = self
                        .forward(&mut subscription, &tx, &cancel, &mut backoff)
                        .await;
                    subscription.close();
                    self.metrics.set_live_connected(false);

                    match end {
                        SubscriptionEnd::Cancelled | SubscriptionEnd::ConsumerGone => break,
                        SubscriptionEnd::Broken(e) => {
                            tracing::warn!(feed = %feed_name, error = %e, "live subscription dropped");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(feed = %feed_name, error = %e, "live subscription failed");
                }
            }

            let delay = backoff.next_delay();
            self.metrics.record_resubscribe();
            tracing::info!(
                feed = %feed_name,
                attempt = backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "resubscribing to live feed"
            );

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(feed = %feed_name, "live channel stopped");
    }

    async fn forward(
        &self,
        subscription: &mut LiveSubscription,
        tx: &mpsc::Sender<RawAlert>,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> SubscriptionEnd {
        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return SubscriptionEnd::Cancelled,
                item = subscription.recv() => item,
            };

            match item {
                Some(Ok(raw)) => {
                    backoff.reset();
                    let sent = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return SubscriptionEnd::Cancelled,
                        sent = tx.send(raw) => sent,
                    };
                    if sent.is_err() {
                        return SubscriptionEnd::ConsumerGone;
                    }
                }
                Some(Err(AlertError::MalformedRecord(detail))) => {
                    self.metrics.record_live_event("malformed");
                    tracing::warn!(error = %detail, "skipping malformed live message");
                }
                Some(Err(e)) => return SubscriptionEnd::Broken(e),
                None => {
                    return SubscriptionEnd::Broken(AlertError::ChannelError(
                        "live stream ended".to_string(),
                    ));
                }
            }
        }
    }
}
