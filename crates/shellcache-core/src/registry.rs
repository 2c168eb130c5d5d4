//! Generation registry.
//!
//! Each deployment of a manifest is a new `Generation`. The registry keeps
//! the one serving requests (`active`) and at most one installed generation
//! waiting to take over (`waiting`). A waiting generation activates when it
//! asked to skip waiting, on an explicit `skip-wait` message, or once the
//! active generation's clients are released.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::fetch::Fetcher;
use crate::lifecycle::{Generation, GenerationStatus, Phase, Signal, SyncContext};
use crate::manifest::ManifestBundle;
use crate::origin::Origin;
use crate::router::Request;
use crate::store::{CacheStorage, CachedResponse};

#[derive(Debug, Clone, Default)]
pub struct RegistryStatus {
    pub active: Option<GenerationStatus>,
    pub waiting: Option<GenerationStatus>,
}

pub struct Registry {
    storage: CacheStorage,
    origin: Origin,
    fetcher: Arc<dyn Fetcher>,
    next_id: u64,
    active: Option<Arc<Generation>>,
    waiting: Option<Arc<Generation>>,
}

impl Registry {
    pub fn new(storage: CacheStorage, origin: Origin, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            storage,
            origin,
            fetcher,
            next_id: 1,
            active: None,
            waiting: None,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn active(&self) -> Option<&Arc<Generation>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<Generation>> {
        self.waiting.as_ref()
    }

    fn context(&mut self, bundle: ManifestBundle) -> (u64, SyncContext) {
        let id = self.next_id;
        self.next_id += 1;
        let ctx = SyncContext::new(
            self.storage.clone(),
            self.origin.clone(),
            bundle,
            Arc::clone(&self.fetcher),
        );
        (id, ctx)
    }

    /// Pick up the generation that was active before a restart.
    /// Returns whether one could be resumed for this bundle.
    pub async fn resume(&mut self, bundle: ManifestBundle) -> SyncResult<bool> {
        let (id, ctx) = self.context(bundle);
        match Generation::resume(id, ctx).await? {
            Some(generation) => {
                self.active = Some(Arc::new(generation));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Install a new generation and activate it if nothing stands in the way.
    ///
    /// A failed install leaves the current active generation serving.
    pub async fn deploy(&mut self, bundle: ManifestBundle) -> SyncResult<Arc<Generation>> {
        let (id, ctx) = self.context(bundle);
        let generation = Arc::new(Generation::new(id, ctx));

        generation.install().await?;

        if self.active.is_none() || generation.wants_skip_waiting() {
            // An older waiting generation must never activate over this one
            if let Some(stale) = self.waiting.take() {
                debug!(generation = stale.id(), superseded_by = id, "Discarded older waiting generation");
            }
            self.promote(Arc::clone(&generation)).await?;
        } else {
            info!(generation = id, "Installed, waiting for active generation to be released");
            if let Some(replaced) = self.waiting.replace(Arc::clone(&generation)) {
                debug!(generation = replaced.id(), "Discarded older waiting generation");
            }
        }
        Ok(generation)
    }

    /// Activate `generation` and make it the one serving requests.
    async fn promote(&mut self, generation: Arc<Generation>) -> SyncResult<()> {
        if self
            .waiting
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(w, &generation))
        {
            self.waiting = None;
        }

        match generation.activate().await {
            Ok(()) if generation.phase() == Phase::Ready => {
                if let Some(previous) = self.active.replace(Arc::clone(&generation)) {
                    info!(from = previous.id(), to = generation.id(), "Generation superseded");
                }
                Ok(())
            }
            Ok(()) => {
                warn!(generation = generation.id(), phase = %generation.phase(), "Generation did not become ready");
                Ok(())
            }
            Err(e) => {
                // Every store was reset; nothing can serve from them anymore
                self.active = None;
                Err(e)
            }
        }
    }

    pub async fn message(&mut self, signal: Signal) -> SyncResult<()> {
        match signal {
            Signal::SkipWait => {
                let Some(waiting) = self.waiting.clone() else {
                    debug!("No waiting generation for skip-wait");
                    return Ok(());
                };
                waiting.message(signal).await?;
                if waiting.wants_skip_waiting() {
                    self.promote(waiting).await?;
                }
                Ok(())
            }
            Signal::PrefetchRemainder => match self.active.clone() {
                Some(active) => active.message(signal).await,
                None => {
                    debug!("No active generation for prefetch");
                    Ok(())
                }
            },
        }
    }

    /// The active generation no longer has clients; a waiting one may take over.
    pub async fn clients_released(&mut self) -> SyncResult<()> {
        match self.waiting.clone() {
            Some(waiting) => self.promote(waiting).await,
            None => Ok(()),
        }
    }

    /// Serve a request through the active generation. `Ok(None)` is a decline.
    pub async fn handle(&self, request: &Request) -> SyncResult<Option<CachedResponse>> {
        match self.active.as_ref().and_then(|g| g.router()) {
            Some(router) => router.handle(request).await,
            None => Ok(None),
        }
    }

    pub async fn status(&self) -> SyncResult<RegistryStatus> {
        let active = match &self.active {
            Some(g) => Some(g.status().await?),
            None => None,
        };
        let waiting = match &self.waiting {
            Some(g) => Some(g.status().await?),
            None => None,
        };
        Ok(RegistryStatus { active, waiting })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::store::CONTENT_STORE;
    use crate::testing::ScriptedFetcher;
    use crate::SyncError;
    use tempfile::TempDir;
    use url::Url;

    const ORIGIN: &str = "https://app.example.com";

    fn bundle(version: &str, skip_waiting: bool) -> ManifestBundle {
        let manifest: Manifest = [("/", version), ("main.js", version)].into_iter().collect();
        ManifestBundle::new(manifest, vec!["main.js".into(), "/".into()])
            .unwrap()
            .with_skip_waiting(skip_waiting)
    }

    fn registry(temp: &TempDir, fetcher: Arc<ScriptedFetcher>) -> Registry {
        Registry::new(
            CacheStorage::new(temp.path().to_path_buf()),
            Origin::parse(ORIGIN).unwrap(),
            fetcher,
        )
    }

    fn online() -> Arc<ScriptedFetcher> {
        Arc::new(
            ScriptedFetcher::new()
                .respond("https://app.example.com/", 200, "index")
                .respond("https://app.example.com/main.js", 200, "main"),
        )
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse(&format!("{}/{}", ORIGIN, path)).unwrap())
    }

    #[tokio::test]
    async fn first_deploy_becomes_active() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp, online());

        let generation = registry.deploy(bundle("v1", false)).await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(generation.id()));
        assert!(registry.waiting().is_none());
        let response = registry.handle(&get("main.js")).await.unwrap().unwrap();
        assert_eq!(response.body, b"main");
    }

    #[tokio::test]
    async fn second_deploy_waits_until_skip_wait() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp, online());
        let first = registry.deploy(bundle("v1", false)).await.unwrap();

        let second = registry.deploy(bundle("v2", false)).await.unwrap();
        assert_eq!(second.phase(), Phase::Installed);
        assert_eq!(registry.active().map(|g| g.id()), Some(first.id()));
        assert_eq!(registry.waiting().map(|g| g.id()), Some(second.id()));

        registry.message(Signal::SkipWait).await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(second.id()));
        assert!(registry.waiting().is_none());
        assert_eq!(second.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn waiting_generation_takes_over_when_clients_released() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp, online());
        registry.deploy(bundle("v1", false)).await.unwrap();
        let second = registry.deploy(bundle("v2", false)).await.unwrap();

        registry.clients_released().await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(second.id()));
    }

    #[tokio::test]
    async fn skip_waiting_bundle_activates_immediately() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp, online());
        registry.deploy(bundle("v1", true)).await.unwrap();
        let second = registry.deploy(bundle("v2", true)).await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(second.id()));
        assert!(registry.waiting().is_none());
    }

    #[tokio::test]
    async fn skip_waiting_deploy_discards_older_waiting_generation() {
        let temp = TempDir::new().unwrap();
        let mut registry = registry(&temp, online());
        registry.deploy(bundle("v1", false)).await.unwrap();
        registry.deploy(bundle("v2", false)).await.unwrap();
        let third = registry.deploy(bundle("v3", true)).await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(third.id()));
        assert!(registry.waiting().is_none());

        registry.clients_released().await.unwrap();

        assert_eq!(registry.active().map(|g| g.id()), Some(third.id()));
        let snapshot = crate::snapshot::ManifestSnapshot::load(registry.storage())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.get("/"), Some("v3"));
    }

    #[tokio::test]
    async fn failed_install_keeps_old_generation_serving() {
        let temp = TempDir::new().unwrap();
        let fetcher = online();
        let mut registry = registry(&temp, fetcher.clone());
        let first = registry.deploy(bundle("v1", true)).await.unwrap();

        fetcher.set_unreachable("https://app.example.com/main.js");
        let err = registry.deploy(bundle("v2", true)).await.unwrap_err();

        assert!(matches!(err, SyncError::InstallFailed(_)));
        assert_eq!(registry.active().map(|g| g.id()), Some(first.id()));
        // Still served from the old generation's cache
        let response = registry.handle(&get("main.js")).await.unwrap().unwrap();
        assert_eq!(response.body, b"main");
    }

    #[tokio::test]
    async fn no_active_generation_declines() {
        let temp = TempDir::new().unwrap();
        let fetcher = online();
        let registry = registry(&temp, fetcher.clone());

        assert!(registry.handle(&get("main.js")).await.unwrap().is_none());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn prefetch_goes_to_active_generation() {
        let temp = TempDir::new().unwrap();
        let fetcher = online();
        fetcher.set_response("https://app.example.com/extra.png", 200, "png");
        let mut registry = registry(&temp, fetcher);
        let manifest: Manifest = [("/", "1"), ("main.js", "1"), ("extra.png", "1")]
            .into_iter()
            .collect();
        registry
            .deploy(ManifestBundle::new(manifest, vec!["main.js".into()]).unwrap())
            .await
            .unwrap();

        registry.message(Signal::PrefetchRemainder).await.unwrap();

        let status = registry.status().await.unwrap();
        let active = status.active.unwrap();
        assert!(active.missing.is_empty());
        assert_eq!(active.content_entries, 3);
        assert_eq!(
            CacheStorage::new(temp.path().to_path_buf())
                .store(CONTENT_STORE)
                .len()
                .await
                .unwrap(),
            3
        );
    }
}
