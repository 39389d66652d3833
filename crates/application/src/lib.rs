#![forbid(unsafe_code)]

pub mod aggregator;
pub mod alert_source;
pub mod live_channel;
pub mod retry;
