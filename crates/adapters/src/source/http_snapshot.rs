use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;
use ports::secondary::snapshot_source::SnapshotSource;

use super::{build_client, decode_records, fetch_body};

/// Primary snapshot path: a plain `GET` against the backend's alerts
/// endpoint, which answers with a JSON array of alert rows.
pub struct HttpSnapshotSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(name: &str, url: &str) -> Result<Self, AlertError> {
        Ok(Self::with_client(name, url, build_client()?))
    }

    /// Create with a custom reqwest client (for testing or advanced config).
    pub fn with_client(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn do_fetch(&self) -> Result<Vec<RawAlert>, AlertError> {
        let body = fetch_body(self.client.get(&self.url), &self.name).await?;
        decode_records(&body, &self.name)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_snapshot<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAlert>, AlertError>> + Send + 'a>> {
        Box::pin(self.do_fetch())
    }
}
