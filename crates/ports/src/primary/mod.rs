pub mod alert_feed_port;
