use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Item delivered on a live subscription.
///
/// `Err(MalformedRecord)` skips one message; `Err(ChannelError)` reports a
/// broken channel and is followed by the end of the subscription.
pub type LiveItem = Result<RawAlert, AlertError>;

/// Secondary port for push delivery of newly inserted alert records.
pub trait LiveFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Open a subscription. Failure to connect is a
    /// [`AlertError::ChannelError`].
    fn subscribe<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<LiveSubscription, AlertError>> + Send + 'a>>;
}

/// Receiving half of a live subscription.
///
/// Dropping or closing it cancels the producer, so no record is delivered
/// after the consumer stops listening.
#[derive(Debug)]
pub struct LiveSubscription {
    rx: mpsc::Receiver<LiveItem>,
    cancel: CancellationToken,
}

/// Producing half of a live subscription, held by the adapter task.
#[derive(Debug, Clone)]
pub struct LivePublisher {
    tx: mpsc::Sender<LiveItem>,
    cancel: CancellationToken,
}

impl LiveSubscription {
    /// Create a connected publisher/subscription pair.
    pub fn channel(buffer: usize) -> (LivePublisher, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        (
            LivePublisher {
                tx,
                cancel: cancel.clone(),
            },
            Self { rx, cancel },
        )
    }

    /// Next item, or `None` once the producer has gone away.
    pub async fn recv(&mut self) -> Option<LiveItem> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop the producer and discard anything still buffered.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LivePublisher {
    /// Deliver one item. Returns `false` when the subscriber is gone.
    pub async fn send(&self, item: LiveItem) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Non-blocking delivery; `false` when full or closed.
    pub fn try_send(&self, item: LiveItem) -> bool {
        !self.cancel.is_cancelled() && self.tx.try_send(item).is_ok()
    }

    /// Resolves once the subscriber closes or drops its half.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}
