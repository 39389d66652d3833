use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::RawAlert;
use domain::alert::error::AlertError;
use ports::secondary::snapshot_source::SnapshotSource;

use super::{build_client, decode_records, fetch_body};

/// Fallback snapshot path: query the alerts table directly through the
/// store's REST interface, newest first.
pub struct RestStoreSource {
    name: String,
    query_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RestStoreSource {
    pub fn new(
        name: &str,
        base_url: &str,
        table: &str,
        limit: usize,
        api_key: Option<String>,
    ) -> Result<Self, AlertError> {
        Ok(Self::with_client(
            name,
            base_url,
            table,
            limit,
            api_key,
            build_client()?,
        ))
    }

    pub fn with_client(
        name: &str,
        base_url: &str,
        table: &str,
        limit: usize,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.to_string(),
            query_url: query_url(base_url, table, limit),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    async fn do_fetch(&self) -> Result<Vec<RawAlert>, AlertError> {
        let mut request = self
            .client
            .get(&self.query_url)
            .header("Accept", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let body = fetch_body(request, &self.name).await?;
        decode_records(&body, &self.name)
    }
}

/// `<base>/rest/v1/<table>?select=*&order=timestamp.desc&limit=<n>`
fn query_url(base_url: &str, table: &str, limit: usize) -> String {
    format!(
        "{}/rest/v1/{}?select=*&order=timestamp.desc&limit={}",
        base_url.trim_end_matches('/'),
        table,
        limit.max(1)
    )
}

impl SnapshotSource for RestStoreSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_snapshot<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAlert>, AlertError>> + Send + 'a>> {
        Box::pin(self.do_fetch())
    }
}
