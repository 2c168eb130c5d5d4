//! Error types for shellcache.
//!
//! Core operations return `SyncResult<T>`. Network failures are carried as
//! `FetchError` so the router can tell them apart from store failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Result type alias for synchronizer operations
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    // Input errors
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Core resource {0:?} is not listed in the manifest")]
    CoreKeyNotInManifest(String),

    #[error("Invalid origin {origin}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Cannot build a URL for resource {key:?}: {reason}")]
    InvalidResourceKey { key: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Store errors
    #[error("Cache store I/O error while {context}: {source}")]
    StoreIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    #[error("Corrupt manifest snapshot: {0}")]
    CorruptSnapshot(String),

    // Network errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    // Lifecycle errors
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Activation failed, caches were reset: {0}")]
    ActivationFailed(String),

    #[error("Event host has shut down")]
    HostClosed,
}

impl SyncError {
    pub(crate) fn store_io(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::StoreIo {
            context: context.into(),
            source,
        }
    }
}
