pub mod alert_handler;
pub mod error;
pub mod health_handler;
pub mod metrics_handler;
pub mod openapi;
pub mod router;
pub mod server;
pub mod state;
pub mod stream_handler;
