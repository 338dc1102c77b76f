//! HTTP table source backed by public object storage.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::{debug, info};

use super::{TableKey, TableSource};

/// Error type for the HTTP source.
#[derive(Debug, thiserror::Error)]
pub enum HttpSourceError {
    /// Client construction failed.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request could not be sent or the body not read.
    #[error("Request to {url} failed: {source}")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// The origin answered with a non-success status.
    #[error("Request to {url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

/// Fetches tables with plain GETs below a base URL.
#[derive(Debug, Clone)]
pub struct HttpTableSource {
    client: HttpClient,
    base_url: String,
}

impl HttpTableSource {
    /// Create a source with a request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HttpSourceError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpSourceError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// The base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TableSource for HttpTableSource {
    type Error = HttpSourceError;

    async fn fetch(&self, key: &TableKey) -> Result<Vec<u8>, Self::Error> {
        let url = key.url(&self.base_url);
        debug!(url = %url, "Downloading overlap table");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| HttpSourceError::Request {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HttpSourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| HttpSourceError::Request {
                url: url.clone(),
                source,
            })?;

        info!(url = %url, bytes = bytes.len(), "Overlap table downloaded");
        Ok(bytes.to_vec())
    }
}
