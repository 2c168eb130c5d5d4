//! Core library for shellcache.
//!
//! Keeps a persistent key→content cache in sync with a declarative manifest
//! of resources and their content identifiers, and serves intercepted read
//! requests from that cache.
//!
//! - `manifest`: the current manifest and its core resource set
//! - `store`: named on-disk cache stores (`content`, `staging`, `manifest-snapshot`)
//! - `snapshot`: the persisted manifest from the last successful activation
//! - `fetch`: the network seam (`Fetcher`) and its reqwest implementation
//! - `lifecycle`: the install → activate → ready state machine and its adapter
//! - `router`: cache-first / network-first request handling
//! - `registry`: overlapping generations and the explicit become-active step
//! - `host`: a single-task event loop that serialises lifecycle events

pub mod error;
pub mod fetch;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod origin;
pub mod registry;
pub mod router;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SyncError, SyncResult};
pub use fetch::{FetchError, FetchMode, Fetcher, HttpFetcher};
pub use host::{Host, HostHandle};
pub use lifecycle::{Generation, GenerationStatus, Phase, Signal, SyncContext};
pub use manifest::{Manifest, ManifestBundle};
pub use origin::Origin;
pub use registry::{Registry, RegistryStatus};
pub use router::{Request, Route, Router};
pub use store::{CacheStorage, CacheStore, CachedResponse};
