//! Request routing.
//!
//! Same-origin GET requests for manifest resources are answered from the
//! content cache. The entry point goes network-first so users see the newest
//! shell when online; everything else goes cache-first. Anything else is
//! declined and left to the network.

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncResult;
use crate::fetch::{FetchMode, Fetcher};
use crate::manifest::{ManifestBundle, ENTRY_POINT};
use crate::origin::{request_identity, Origin};
use crate::store::{CacheStore, CachedResponse};

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not ours; the network handles it unmodified
    Decline,
    NetworkFirst { key: String },
    CacheFirst { key: String },
}

/// Decide how a request is served. Touches neither cache nor network.
pub fn classify(request: &Request, origin: &Origin, bundle: &ManifestBundle) -> Route {
    if request.method != Method::GET {
        return Route::Decline;
    }
    let Some(key) = origin.request_key(&request.url) else {
        return Route::Decline;
    };
    if !bundle.manifest().contains(&key) {
        return Route::Decline;
    }
    if key == ENTRY_POINT {
        Route::NetworkFirst { key }
    } else {
        Route::CacheFirst { key }
    }
}

/// Serves requests for one generation from its content cache.
/// Clone is cheap - the bundle and fetcher are shared.
#[derive(Clone)]
pub struct Router {
    origin: Origin,
    bundle: Arc<ManifestBundle>,
    content: CacheStore,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(
        origin: Origin,
        bundle: Arc<ManifestBundle>,
        content: CacheStore,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            origin,
            bundle,
            content,
            fetcher,
        }
    }

    pub fn classify(&self, request: &Request) -> Route {
        classify(request, &self.origin, &self.bundle)
    }

    /// Serve a request. `Ok(None)` means the router declined it.
    pub async fn handle(&self, request: &Request) -> SyncResult<Option<CachedResponse>> {
        let response = match self.classify(request) {
            Route::Decline => {
                debug!(url = %request.url, "Declined request");
                return Ok(None);
            }
            Route::NetworkFirst { key } => {
                debug!(key = %key, "Network-first");
                self.network_first(&request_identity(&request.url)).await?
            }
            Route::CacheFirst { key } => {
                debug!(key = %key, "Cache-first");
                self.cache_first(&request_identity(&request.url)).await?
            }
        };
        Ok(Some(response))
    }

    async fn cache_first(&self, url: &Url) -> SyncResult<CachedResponse> {
        let key = url.as_str();
        match self.content.get(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(url = %url, error = %e, "Content cache read failed, treating as miss"),
        }

        // Network errors propagate to the caller
        let response = self.fetcher.fetch(url, FetchMode::Default).await?;
        if response.is_success() {
            self.store(key, &response).await;
        }
        Ok(response)
    }

    async fn network_first(&self, url: &Url) -> SyncResult<CachedResponse> {
        let key = url.as_str();
        match self.fetcher.fetch(url, FetchMode::Default).await {
            Ok(response) => {
                self.store(key, &response).await;
                Ok(response)
            }
            Err(network_error) => {
                debug!(url = %url, error = %network_error, "Network failed, falling back to cache");
                match self.content.get(key).await {
                    Ok(Some(cached)) => Ok(cached),
                    Ok(None) => Err(network_error.into()),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Content cache read failed");
                        Err(network_error.into())
                    }
                }
            }
        }
    }

    /// Store failures never fail the request that produced the response.
    async fn store(&self, key: &str, response: &CachedResponse) {
        if let Err(e) = self.content.put(key, response).await {
            warn!(key = %key, error = %e, "Failed to populate content cache");
        }
    }
}
