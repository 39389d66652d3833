use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;
use ports::secondary::live_feed::{LiveFeed, LivePublisher, LiveSubscription};
use serde::Deserialize;

use crate::source::USER_AGENT;

/// Longest accepted change line. A peer streaming more than this without a
/// newline is treated as a broken channel.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIPTION_BUFFER: usize = 256;

/// One line of the change feed.
#[derive(Debug, Deserialize)]
struct ChangeEnvelope {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    record: Option<RawAlert>,
}

/// Classification of a single change line.
#[derive(Debug, PartialEq)]
pub enum ChangeLine {
    Insert(RawAlert),
    /// Keep-alive, other event types, other tables.
    Ignored,
    Malformed(String),
}

/// Interpret one newline-delimited change envelope
/// (`{"type":"INSERT","table":"alerts","record":{...}}`).
pub fn parse_change_line(line: &[u8], table: Option<&str>) -> ChangeLine {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return ChangeLine::Ignored;
    }

    let envelope: ChangeEnvelope = match serde_json::from_slice(trimmed) {
        Ok(envelope) => envelope,
        Err(e) => return ChangeLine::Malformed(format!("invalid change line: {e}")),
    };

    // Keep-alives carry no type.
    if !envelope
        .kind
        .as_deref()
        .is_some_and(|kind| kind.eq_ignore_ascii_case("INSERT"))
    {
        return ChangeLine::Ignored;
    }
    if let (Some(expected), Some(actual)) = (table, envelope.table.as_deref())
        && expected != actual
    {
        return ChangeLine::Ignored;
    }

    match envelope.record {
        Some(record) => ChangeLine::Insert(record),
        None => ChangeLine::Malformed("INSERT change without record".to_string()),
    }
}

/// Live feed over a long-lived HTTP response carrying NDJSON change
/// envelopes, one per inserted row.
pub struct NdjsonLiveFeed {
    name: String,
    url: String,
    table: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl NdjsonLiveFeed {
    pub fn new(
        name: &str,
        url: &str,
        table: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, AlertError> {
        // No overall timeout: the response body stays open indefinitely.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AlertError::ChannelError(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            table,
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    async fn connect(&self) -> Result<LiveSubscription, AlertError> {
        let mut request = self
            .client
            .get(&self.url)
            .header("Accept", "application/x-ndjson");
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AlertError::ChannelError(format!("live connect failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AlertError::ChannelError(format!(
                "live endpoint returned HTTP {}",
                response.status()
            )));
        }

        let (publisher, subscription) = LiveSubscription::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(read_changes(response, publisher, self.table.clone()));
        tracing::debug!(feed = %self.name, url = %self.url, "live change stream connected");
        Ok(subscription)
    }
}

impl LiveFeed for NdjsonLiveFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<LiveSubscription, AlertError>> + Send + 'a>> {
        Box::pin(self.connect())
    }
}

/// Read the response body until it ends, fails, or the subscriber leaves.
/// Dropping `response` on return closes the connection.
async fn read_changes(
    mut response: reqwest::Response,
    publisher: LivePublisher,
    table: Option<String>,
) {
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            () = publisher.cancelled() => return,
            chunk = response.chunk() => chunk,
        };

        let bytes = match chunk {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                publisher
                    .send(Err(AlertError::ChannelError(
                        "live stream closed by server".to_string(),
                    )))
                    .await;
                return;
            }
            Err(e) => {
                publisher
                    .send(Err(AlertError::ChannelError(format!(
                        "live stream read failed: {e}"
                    ))))
                    .await;
                return;
            }
        };

        buffer.extend_from_slice(&bytes);
        while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let item = match parse_change_line(&line, table.as_deref()) {
                ChangeLine::Insert(record) => Ok(record),
                ChangeLine::Ignored => continue,
                ChangeLine::Malformed(detail) => Err(AlertError::MalformedRecord(detail)),
            };
            if !publisher.send(item).await {
                return;
            }
        }

        if buffer.len() > MAX_LINE_LENGTH {
            publisher
                .send(Err(AlertError::ChannelError(format!(
                    "live change line exceeded {MAX_LINE_LENGTH} bytes"
                ))))
                .await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_server::serve;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use domain::alert::entity::RawAlertId;
    use std::convert::Infallible;

    const INSERT_1: &str = r#"{"type":"INSERT","table":"alerts","record":{"id":1,"event":"ssh","source_ip":"10.0.0.1","timestamp":"2025-01-01T00:00:00Z"}}"#;
    const INSERT_2: &str = r#"{"type":"INSERT","table":"alerts","record":{"id":2,"event":"scan","source_ip":"10.0.0.2"}}"#;

    #[test]
    fn parses_insert() {
        let ChangeLine::Insert(record) = parse_change_line(INSERT_1.as_bytes(), Some("alerts"))
        else {
            panic!("expected insert");
        };
        assert_eq!(record.id, Some(RawAlertId::Number(1)));
        assert_eq!(record.event.as_deref(), Some("ssh"));
    }

    #[test]
    fn ignores_other_events_tables_and_blank_lines() {
        let update = br#"{"type":"UPDATE","table":"alerts","record":{"id":1}}"#;
        let other = br#"{"type":"INSERT","table":"rules","record":{"id":1}}"#;
        assert_eq!(parse_change_line(update, None), ChangeLine::Ignored);
        assert_eq!(parse_change_line(other, Some("alerts")), ChangeLine::Ignored);
        assert_eq!(parse_change_line(b"  \r\n", None), ChangeLine::Ignored);
    }

    #[test]
    fn table_filter_is_optional() {
        let other = br#"{"type":"insert","table":"rules","record":{"id":1}}"#;
        assert!(matches!(parse_change_line(other, None), ChangeLine::Insert(_)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_change_line(b"{not json", None),
            ChangeLine::Malformed(_)
        ));
        assert!(matches!(
            parse_change_line(br#"{"type":"INSERT"}"#, None),
            ChangeLine::Malformed(_)
        ));
    }

    #[test]
    fn untyped_keepalive_is_ignored() {
        assert_eq!(
            parse_change_line(br#"{"event":"heartbeat"}"#, Some("alerts")),
            ChangeLine::Ignored
        );
        assert_eq!(parse_change_line(br#"{"type":null}"#, None), ChangeLine::Ignored);
    }

    #[test]
    fn insert_with_wrongly_typed_fields_is_kept() {
        let line = br#"{"type":"INSERT","table":"alerts","record":{"id":9,"event":["x"],"source_ip":"10.0.0.9","timestamp":1735689600}}"#;
        let ChangeLine::Insert(record) = parse_change_line(line, Some("alerts")) else {
            panic!("expected insert");
        };
        assert_eq!(record.id, Some(RawAlertId::Number(9)));
        assert_eq!(record.event, None);
        assert_eq!(record.source_ip.as_deref(), Some("10.0.0.9"));
        assert_eq!(record.timestamp, None);
    }

    fn stream_router(chunks: Vec<String>) -> Router {
        Router::new().route(
            "/changes",
            get(move || {
                let chunks = chunks.clone();
                async move {
                    let stream = tokio_stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
                    Body::from_stream(stream)
                }
            }),
        )
    }

    #[tokio::test]
    async fn delivers_records_in_order_then_reports_close() {
        let first = format!("{INSERT_1}\n\n{{\"type\":\"DELETE\"}}\n");
        // Second record split across chunks.
        let (head, tail) = INSERT_2.split_at(20);
        let addr = serve(stream_router(vec![first, head.to_string(), format!("{tail}\n")])).await;

        let feed =
            NdjsonLiveFeed::new("live", &format!("http://{addr}/changes"), Some("alerts".into()), None)
                .unwrap();
        let mut subscription = feed.subscribe().await.unwrap();

        let one = subscription.recv().await.unwrap().unwrap();
        assert_eq!(one.id, Some(RawAlertId::Number(1)));
        let two = subscription.recv().await.unwrap().unwrap();
        assert_eq!(two.id, Some(RawAlertId::Number(2)));

        let end = subscription.recv().await.unwrap().unwrap_err();
        assert!(matches!(end, AlertError::ChannelError(_)));
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_reported_and_stream_continues() {
        let addr = serve(stream_router(vec![format!("garbage\n{INSERT_2}\n")])).await;
        let feed = NdjsonLiveFeed::new("live", &format!("http://{addr}/changes"), None, None).unwrap();
        let mut subscription = feed.subscribe().await.unwrap();

        assert!(matches!(
            subscription.recv().await.unwrap(),
            Err(AlertError::MalformedRecord(_))
        ));
        assert!(subscription.recv().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn error_status_fails_subscribe() {
        let router = Router::new().route(
            "/changes",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "") }),
        );
        let addr = serve(router).await;
        let feed = NdjsonLiveFeed::new("live", &format!("http://{addr}/changes"), None, None).unwrap();

        let err = feed.subscribe().await.unwrap_err();
        assert!(matches!(err, AlertError::ChannelError(_)));
        assert!(err.to_string().contains("503"), "got: {err}");
    }

    #[tokio::test]
    async fn closing_subscription_stops_delivery() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, Infallible>>(8);
        let rx = std::sync::Mutex::new(Some(rx));
        let rx = std::sync::Arc::new(rx);
        let router = Router::new().route(
            "/changes",
            get(move || {
                let rx = rx.lock().unwrap().take();
                async move {
                    let rx = rx.expect("single subscriber");
                    Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx))
                }
            }),
        );
        let addr = serve(router).await;
        let feed = NdjsonLiveFeed::new("live", &format!("http://{addr}/changes"), None, None).unwrap();
        let mut subscription = feed.subscribe().await.unwrap();

        tx.send(Ok(format!("{INSERT_1}\n"))).await.unwrap();
        assert!(subscription.recv().await.unwrap().is_ok());

        subscription.close();
        let _ = tx.send(Ok(format!("{INSERT_2}\n"))).await;
        assert!(subscription.recv().await.is_none());
    }
}
