//! Application configuration management.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`. Command line
//! flags and `SHELLCACHE_*` environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcache_core::fetch::http::DEFAULT_REQUEST_TIMEOUT_SECS;
use shellcache_core::{ManifestBundle, Origin};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Origin the cached application is served from
    pub origin: Option<String>,
    /// JSON object of resource key → content identifier
    pub manifest: Option<PathBuf>,
    /// JSON array of the core resource keys
    pub core: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// 0 disables the client-side timeout
    pub request_timeout_secs: Option<u64>,
    pub skip_waiting: Option<bool>,
    /// When set, logs are also written to a daily rolling file here
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply values given on the command line. Set fields win over the file.
    pub fn merge(mut self, overrides: Config) -> Self {
        if overrides.origin.is_some() {
            self.origin = overrides.origin;
        }
        if overrides.manifest.is_some() {
            self.manifest = overrides.manifest;
        }
        if overrides.core.is_some() {
            self.core = overrides.core;
        }
        if overrides.cache_dir.is_some() {
            self.cache_dir = overrides.cache_dir;
        }
        if overrides.request_timeout_secs.is_some() {
            self.request_timeout_secs = overrides.request_timeout_secs;
        }
        if overrides.skip_waiting.is_some() {
            self.skip_waiting = overrides.skip_waiting;
        }
        if overrides.log_dir.is_some() {
            self.log_dir = overrides.log_dir;
        }
        self
    }

    pub fn origin(&self) -> Result<Origin> {
        let origin = self
            .origin
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No origin configured (use --origin or SHELLCACHE_ORIGIN)"))?;
        Ok(Origin::parse(origin)?)
    }

    pub fn bundle(&self) -> Result<ManifestBundle> {
        let manifest = self
            .manifest
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No manifest configured (use --manifest)"))?;
        let core = self
            .core
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No core list configured (use --core)"))?;
        let bundle = ManifestBundle::load(manifest, core)
            .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
        Ok(bundle.with_skip_waiting(self.skip_waiting.unwrap_or(true)))
    }

    /// Configured cache directory, or one per origin host under the user cache dir.
    pub fn cache_dir(&self, origin: &Origin) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(host) = origin.host() {
            path = path.join(host);
        }
        Ok(path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
