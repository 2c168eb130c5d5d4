//! Network seam.
//!
//! `Fetcher` is the only way the synchronizer reaches the network. The
//! production implementation is `HttpFetcher` (reqwest); tests substitute
//! scripted fetchers.

pub mod error;
pub mod http;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncResult;
use crate::origin::cache_key;
use crate::store::{CacheStore, CachedResponse};

pub use error::FetchError;
pub use http::HttpFetcher;

/// Maximum number of fetches in flight during a bulk add.
/// Keeps prefetch of large manifests from opening hundreds of connections.
pub const MAX_CONCURRENT_FETCHES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Normal request; intermediate HTTP caches may answer
    Default,
    /// Bypass intermediate caches and revalidate with the origin
    Reload,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a GET. Any HTTP status is `Ok`; only transport failures are `Err`.
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<CachedResponse, FetchError>;
}

/// Fetch every URL and store the responses, all or nothing.
///
/// Nothing is written unless every fetch succeeds with a 2xx status.
/// Returns the number of entries written.
pub async fn add_all(
    store: &CacheStore,
    fetcher: &dyn Fetcher,
    urls: &[Url],
    mode: FetchMode,
) -> SyncResult<usize> {
    let mut fetched = Vec::with_capacity(urls.len());

    for chunk in urls.chunks(MAX_CONCURRENT_FETCHES) {
        let futures: Vec<_> = chunk
            .iter()
            .map(|url| async move { (url, fetcher.fetch(url, mode).await) })
            .collect();

        for (url, result) in futures::future::join_all(futures).await {
            let response = result.inspect_err(|e| {
                warn!(url = %url, error = %e, "Bulk fetch failed");
            })?;
            if !response.is_success() {
                warn!(url = %url, status = response.status, "Bulk fetch returned non-success status");
                return Err(FetchError::BadStatus {
                    url: url.to_string(),
                    status: response.status,
                }
                .into());
            }
            fetched.push((cache_key(url), response));
        }
    }

    for (key, response) in &fetched {
        store.put(key, response).await?;
    }
    debug!(store = store.name(), count = fetched.len(), "Bulk add complete");
    Ok(fetched.len())
}
