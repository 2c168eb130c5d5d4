//! One-shot subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_core::store::{CONTENT_STORE, SNAPSHOT_STORE, STAGING_STORE};
use shellcache_core::{
    CacheStorage, CachedResponse, FetchMode, Fetcher, HttpFetcher, Origin, Registry,
    RegistryStatus, Request, Signal,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::format::{describe_generation, describe_response};

/// Everything a command needs, resolved from the effective configuration
pub struct Session {
    pub config: Config,
    pub origin: Origin,
    pub storage: CacheStorage,
    pub fetcher: Arc<HttpFetcher>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let origin = config.origin()?;
        let cache_dir = config.cache_dir(&origin)?;
        let fetcher = HttpFetcher::new(config.request_timeout())
            .context("Failed to create HTTP client")?;
        debug!(origin = %origin, cache_dir = %cache_dir.display(), "Session configured");
        Ok(Self {
            config,
            origin,
            storage: CacheStorage::new(cache_dir),
            fetcher: Arc::new(fetcher),
        })
    }

    pub fn registry(&self) -> Registry {
        Registry::new(
            self.storage.clone(),
            self.origin.clone(),
            Arc::clone(&self.fetcher) as Arc<dyn Fetcher>,
        )
    }

    /// Fetch a declined request from the network, unmodified.
    pub async fn pass_through(&self, url: &Url) -> Result<CachedResponse> {
        info!(url = %url, "Not a cached resource, fetching directly");
        self.fetcher
            .fetch(url, FetchMode::Default)
            .await
            .with_context(|| format!("Failed to fetch {}", url))
    }

    /// A registry with the generation left active by the last `sync`, if its
    /// snapshot still matches the configured manifest.
    pub async fn resumed_registry(&self) -> Result<(Registry, bool)> {
        let mut registry = self.registry();
        let resumed = registry.resume(self.config.bundle()?).await?;
        if !resumed {
            debug!("No generation to resume for the configured manifest");
        }
        Ok((registry, resumed))
    }
}

pub fn init(config: &Config, path: Option<&Path>) -> Result<()> {
    config.save(path)?;
    let shown = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("Wrote {}", shown.display());
    Ok(())
}

pub async fn sync(session: &Session) -> Result<()> {
    let mut registry = session.registry();
    let generation = registry.deploy(session.config.bundle()?).await?;
    let status = generation.status().await?;
    println!("{}", describe_generation("Synced", &status));
    Ok(())
}

/// Serve one GET. Declined requests go to the network unmodified.
pub async fn get(session: &Session, target: &str, output: Option<&Path>) -> Result<()> {
    let (registry, resumed) = session.resumed_registry().await?;
    if !resumed {
        anyhow::bail!("No active generation for this manifest; run `shellcache sync` first");
    }

    let url = session.origin.resolve(target)?;
    let response = match registry.handle(&Request::get(url.clone())).await? {
        Some(response) => response,
        None => session.pass_through(&url).await?,
    };

    eprintln!("{}", describe_response(&response));
    write_body(&response, output).await
}

async fn write_body(response: &CachedResponse, output: Option<&Path>) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    match output {
        Some(path) => tokio::fs::write(path, &response.body)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&response.body).await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}

pub async fn message(session: &Session, signal: &str) -> Result<()> {
    let signal: Signal = match signal.parse() {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Ignoring message");
            return Ok(());
        }
    };

    let (mut registry, resumed) = session.resumed_registry().await?;
    if !resumed {
        anyhow::bail!("No active generation for this manifest; run `shellcache sync` first");
    }
    registry.message(signal).await?;
    print_status(&registry.status().await?);
    Ok(())
}

pub async fn status(session: &Session) -> Result<()> {
    let (registry, _) = session.resumed_registry().await?;
    print_status(&registry.status().await?);
    Ok(())
}

pub fn print_status(status: &RegistryStatus) {
    match &status.active {
        Some(active) => println!("{}", describe_generation("Active", active)),
        None => println!("No active generation"),
    }
    if let Some(waiting) = &status.waiting {
        println!("{}", describe_generation("Waiting", waiting));
    }
}

pub async fn clear(session: &Session) -> Result<()> {
    for name in [CONTENT_STORE, STAGING_STORE, SNAPSHOT_STORE] {
        if session.storage.delete(name).await? {
            info!(store = name, "Deleted store");
        }
    }
    println!("Cleared {}", session.storage.root().display());
    Ok(())
}
