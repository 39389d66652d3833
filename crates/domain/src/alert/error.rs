use thiserror::Error;

/// Failure taxonomy of the alert ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    /// Every snapshot path failed. Recovered on the next periodic tick or
    /// manual refresh.
    #[error("alert source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single record could not be mapped. The rest of the batch proceeds.
    #[error("malformed alert record: {0}")]
    MalformedRecord(String),

    /// The live subscription dropped or could not be opened.
    #[error("live channel error: {0}")]
    ChannelError(String),

    /// Published collection broke an invariant (duplicate id, bound exceeded).
    /// Indicates a bug; the collection has already been healed when this is
    /// returned.
    #[error("feed invariant violated: {0}")]
    InvariantViolation(String),

    #[error("alert aggregator is not running")]
    AggregatorStopped,
}

impl AlertError {
    /// Whether a later attempt may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::ChannelError(_))
    }
}
