//! HTTP client for the upstream book catalog.
//!
//! Wraps the catalog's REST endpoint (`GET {url}` and `GET {url}/{id}`)
//! using [`reqwest`] with a bounded request timeout.

use shared::{ExternalBookRecord, LibraryError};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LibraryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LibraryError::external("failed to build catalog client", e))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the whole catalog. An empty or `null` body is an empty catalog.
    pub async fn fetch_all(&self) -> Result<Vec<ExternalBookRecord>, LibraryError> {
        info!("Fetching books from external catalog: {}", self.base_url());
        let body = self.get(self.base_url()).await?.unwrap_or_default();
        let books: Vec<ExternalBookRecord> = parse_body(&body)?.unwrap_or_default();
        info!("Fetched {} books from external catalog", books.len());
        Ok(books)
    }

    /// Fetches a single book; `None` when the catalog does not know it.
    pub async fn fetch_by_id(&self, id: i64) -> Result<Option<ExternalBookRecord>, LibraryError> {
        let url = format!("{}/{}", self.base_url(), id);
        info!("Fetching book {} from external catalog: {}", id, url);
        match self.get(&url).await? {
            Some(body) => parse_body(&body),
            None => Ok(None),
        }
    }

    /// Body of a successful response, `None` on 404.
    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>, LibraryError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Error calling external catalog {}: {}", url, e);
            LibraryError::external(format!("request to {url} failed"), e)
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            error!("External catalog {} answered with status {}", url, status);
            return Err(LibraryError::ExternalService {
                message: format!("catalog answered {status} for {url}"),
                source: None,
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            error!("Error reading external catalog response from {}: {}", url, e);
            LibraryError::external(format!("reading response from {url} failed"), e)
        })?;
        Ok(Some(bytes.to_vec()))
    }
}

fn parse_body<T>(body: &[u8]) -> Result<Option<T>, LibraryError>
where
    T: serde::de::DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(body)
        .map_err(|e| LibraryError::external("malformed catalog response", e))
}
