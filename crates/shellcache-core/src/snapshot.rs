//! Persisted manifest snapshot.
//!
//! The `manifest-snapshot` store holds a single entry under a fixed key whose
//! body is the manifest of the last successful activation, as JSON.

use crate::error::{SyncError, SyncResult};
use crate::manifest::Manifest;
use crate::store::{CacheStorage, CachedResponse, StoredEntry, SNAPSHOT_STORE};

/// Fixed key of the snapshot entry
pub const SNAPSHOT_KEY: &str = "manifest";

pub struct ManifestSnapshot;

impl ManifestSnapshot {
    /// Load the prior manifest. `None` means no activation has completed yet.
    pub async fn load(storage: &CacheStorage) -> SyncResult<Option<Manifest>> {
        let Some(entry) = Self::entry(storage).await? else {
            return Ok(None);
        };

        let json = std::str::from_utf8(&entry.response.body)
            .map_err(|e| SyncError::CorruptSnapshot(e.to_string()))?;
        let manifest =
            Manifest::from_json(json).map_err(|e| SyncError::CorruptSnapshot(e.to_string()))?;
        Ok(Some(manifest))
    }

    pub async fn save(storage: &CacheStorage, manifest: &Manifest) -> SyncResult<()> {
        let response = CachedResponse::new(200, manifest.to_json())
            .with_header("Content-Type", "application/json");
        storage
            .store(SNAPSHOT_STORE)
            .put(SNAPSHOT_KEY, &response)
            .await
    }

    /// The raw snapshot entry, including when it was written
    pub async fn entry(storage: &CacheStorage) -> SyncResult<Option<StoredEntry>> {
        match storage.store(SNAPSHOT_STORE).entry(SNAPSHOT_KEY).await {
            Err(SyncError::CorruptEntry { reason, .. }) => Err(SyncError::CorruptSnapshot(reason)),
            other => other,
        }
    }
}
