use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, warn};

use super::entry::{self, CachedResponse, StoredEntry};
use crate::error::{SyncError, SyncResult};

/// Durable store serving runtime requests
pub const CONTENT_STORE: &str = "content";

/// Transient store filled with the core set during install
pub const STAGING_STORE: &str = "staging";

/// Holds the manifest of the last successful activation
pub const SNAPSHOT_STORE: &str = "manifest-snapshot";

const ENTRY_EXTENSION: &str = "entry";

/// Distinguishes concurrent temp files written by this process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Root directory holding one sub-directory per named store.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle to a named store. The directory is created on first write.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore {
            name: name.to_string(),
            dir: self.root.join(name),
        }
    }

    pub async fn has(&self, name: &str) -> bool {
        tokio::fs::metadata(self.root.join(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Delete a whole store. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> SyncResult<bool> {
        match tokio::fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => {
                debug!(store = name, "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::store_io(format!("deleting store {}", name), e)),
        }
    }
}

/// One named key→response store.
///
/// Each entry lives in its own file named by the SHA-256 of its key, so a
/// put or delete touches exactly one file. Puts are written to a temp file
/// and renamed into place, which keeps individual keys atomic without locks.
#[derive(Debug, Clone)]
pub struct CacheStore {
    name: String,
    dir: PathBuf,
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    pub async fn get(&self, key: &str) -> SyncResult<Option<CachedResponse>> {
        Ok(self.entry(key).await?.map(|e| e.response))
    }

    pub async fn entry(&self, key: &str) -> SyncResult<Option<StoredEntry>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::store_io(
                    format!("reading {} from {}", key, self.name),
                    e,
                ))
            }
        };
        let entry = entry::decode(&bytes).map_err(|reason| SyncError::CorruptEntry {
            path: path.clone(),
            reason,
        })?;
        // A digest collision would be astronomically unlikely, but never serve
        // a response stored under a different key
        if entry.url != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub async fn put(&self, key: &str, response: &CachedResponse) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SyncError::store_io(format!("creating store {}", self.name), e))?;

        let bytes = entry::encode(key, response)?;
        let path = self.entry_path(key);
        let temp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| SyncError::store_io(format!("writing {} to {}", key, self.name), e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(SyncError::store_io(
                format!("committing {} to {}", key, self.name),
                e,
            ));
        }
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> SyncResult<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::store_io(
                format!("deleting {} from {}", key, self.name),
                e,
            )),
        }
    }

    /// Keys of every entry, sorted. A missing store has no keys.
    pub async fn keys(&self) -> SyncResult<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::store_io(format!("listing {}", self.name), e)),
        };

        let mut keys = Vec::new();
        loop {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| SyncError::store_io(format!("listing {}", self.name), e))?;
            let Some(item) = next else { break };
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match read_key(&path).await {
                Ok(key) => keys.push(key),
                // Removed by a concurrent delete between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(store = %self.name, path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }
}

async fn read_key(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    entry::decode_header(&line)
        .map(|h| h.url)
        .map_err(|reason| std::io::Error::new(ErrorKind::InvalidData, reason))
}
