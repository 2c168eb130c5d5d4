//! Resource manifest and core resource set.
//!
//! The manifest maps resource keys to opaque content identifiers. It is
//! produced by a build step and is immutable for the lifetime of a
//! generation. Manifests are only ever compared key by key.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Reserved key for the application entry point (the origin root)
pub const ENTRY_POINT: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    resources: BTreeMap<String, String>,
}

impl Manifest {
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidManifest(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // A string-keyed map of strings always serializes
        serde_json::to_string(&self.resources).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.resources.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// True when `key` is present in both manifests with the same identifier.
    pub fn is_unchanged_since(&self, prior: &Manifest, key: &str) -> bool {
        match (self.get(key), prior.get(key)) {
            (Some(current), Some(previous)) => current == previous,
            _ => false,
        }
    }

    /// Manifest keys not present in `present`, in key order.
    pub fn missing_from<'a>(&'a self, present: &HashSet<String>) -> Vec<&'a str> {
        self.keys().filter(|k| !present.contains(*k)).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            resources: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A manifest together with the core set required to boot the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestBundle {
    manifest: Manifest,
    core: Vec<String>,
    skip_waiting: bool,
}

impl ManifestBundle {
    /// Build a bundle, rejecting core keys absent from the manifest.
    pub fn new(manifest: Manifest, core: Vec<String>) -> SyncResult<Self> {
        if let Some(missing) = core.iter().find(|k| !manifest.contains(k)) {
            return Err(SyncError::CoreKeyNotInManifest(missing.clone()));
        }
        Ok(Self {
            manifest,
            core,
            skip_waiting: true,
        })
    }

    /// Load the manifest object and core list from two JSON files.
    pub fn load(manifest_path: &Path, core_path: &Path) -> SyncResult<Self> {
        let manifest = Manifest::from_json(&read_input(manifest_path)?)?;
        let core: Vec<String> = serde_json::from_str(&read_input(core_path)?)
            .map_err(|e| SyncError::InvalidManifest(format!("core list: {}", e)))?;
        Self::new(manifest, core)
    }

    /// Whether a freshly installed generation activates without waiting for
    /// the current one to release its clients.
    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn core(&self) -> &[String] {
        &self.core
    }

    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting
    }
}

fn read_input(path: &Path) -> SyncResult<String> {
    std::fs::read_to_string(path).map_err(|source| SyncError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}
