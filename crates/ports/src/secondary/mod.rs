pub mod live_feed;
pub mod metrics_port;
pub mod snapshot_source;
