//! reqwest-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use super::{FetchError, FetchMode, Fetcher};
use crate::error::{SyncError, SyncResult};
use crate::store::CachedResponse;

/// HTTP request timeout used when none is configured.
/// 30s allows for slow origins while still unblocking a stalled install.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `None` disables the client-side timeout entirely.
    pub fn new(timeout: Option<Duration>) -> SyncResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| {
            SyncError::Fetch(FetchError::Network {
                url: String::new(),
                source,
            })
        })?;
        Ok(Self { client })
    }

    pub fn with_default_timeout() -> SyncResult<Self> {
        Self::new(Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<CachedResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        if mode == FetchMode::Reload {
            request = request
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let network = |source| FetchError::Network {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network)?;

        debug!(url = %url, status, bytes = body.len(), ?mode, "Fetched resource");
        Ok(CachedResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
