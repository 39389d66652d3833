//! Live change feed subscriptions.

pub mod ndjson_feed;
