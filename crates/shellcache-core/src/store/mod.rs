//! Named on-disk cache stores.
//!
//! A `CacheStorage` root holds the three stores the synchronizer uses:
//! - `content`: durable, serves runtime requests
//! - `staging`: transient, filled with the core set during install
//! - `manifest-snapshot`: the manifest of the last successful activation
//!
//! Entries are keyed by request identity (absolute URL without fragment).

pub mod disk;
pub mod entry;

pub use disk::{CacheStorage, CacheStore, CONTENT_STORE, SNAPSHOT_STORE, STAGING_STORE};
pub use entry::{CachedResponse, StoredEntry};
