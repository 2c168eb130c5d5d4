use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error, info, warn};
use url::Url;

use super::machine::{missing_keys, transition, Effect, Event, Phase, Signal, State, Transition};
use crate::error::{SyncError, SyncResult};
use crate::fetch::{add_all, FetchMode, Fetcher};
use crate::manifest::ManifestBundle;
use crate::origin::Origin;
use crate::router::Router;
use crate::snapshot::ManifestSnapshot;
use crate::store::{CacheStorage, CacheStore, CONTENT_STORE, STAGING_STORE};

/// Everything a generation needs, passed in explicitly.
/// Clone is cheap - the bundle and fetcher are shared.
#[derive(Clone)]
pub struct SyncContext {
    pub storage: CacheStorage,
    pub origin: Origin,
    pub bundle: Arc<ManifestBundle>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl SyncContext {
    pub fn new(
        storage: CacheStorage,
        origin: Origin,
        bundle: ManifestBundle,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            storage,
            origin,
            bundle: Arc::new(bundle),
            fetcher,
        }
    }

    fn urls_for(&self, keys: &[String]) -> SyncResult<Vec<Url>> {
        keys.iter().map(|k| self.origin.resource_url(k)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct GenerationStatus {
    pub id: u64,
    pub phase: Phase,
    pub manifest_entries: usize,
    pub content_entries: usize,
    /// Age of the persisted snapshot, e.g. "5m ago"
    pub snapshot_age: Option<String>,
    pub missing: Vec<String>,
}

/// One deployed version of the manifest and its lifecycle.
///
/// Holds its own content cache handle once activated, so an older generation
/// keeps serving until the registry replaces it.
pub struct Generation {
    id: u64,
    ctx: SyncContext,
    state: Mutex<State>,
    content: OnceLock<CacheStore>,
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("claimed", &self.content.get().is_some())
            .finish()
    }
}

impl Generation {
    pub fn new(id: u64, ctx: SyncContext) -> Self {
        let state = State::new(ctx.bundle.skip_waiting());
        Self {
            id,
            ctx,
            state: Mutex::new(state),
            content: OnceLock::new(),
        }
    }

    /// Re-materialise an already activated generation after a restart.
    ///
    /// Only succeeds when the persisted snapshot matches the bundle's
    /// manifest; anything else needs a full install and activate.
    pub async fn resume(id: u64, ctx: SyncContext) -> SyncResult<Option<Self>> {
        let prior = match ManifestSnapshot::load(&ctx.storage).await {
            Ok(prior) => prior,
            Err(SyncError::CorruptSnapshot(reason)) => {
                warn!(reason = %reason, "Snapshot unreadable, cannot resume");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if prior.as_ref() != Some(ctx.bundle.manifest()) {
            debug!("Snapshot does not match manifest, cannot resume");
            return Ok(None);
        }

        let generation = Self {
            id,
            content: OnceLock::from(ctx.storage.store(CONTENT_STORE)),
            ctx,
            state: Mutex::new(State::ready()),
        };
        info!(generation = id, "Resumed ready generation");
        Ok(Some(generation))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn wants_skip_waiting(&self) -> bool {
        self.state().skip_waiting
    }

    fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: State) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Stage the core set. Fails with `InstallFailed` if any core fetch fails.
    pub async fn install(&self) -> SyncResult<()> {
        info!(generation = self.id, core = self.ctx.bundle.core().len(), "Installing");
        self.dispatch(Event::Install).await?;
        if self.phase() != Phase::Installed {
            return Err(SyncError::InstallFailed(format!(
                "generation {} is {}",
                self.id,
                self.phase()
            )));
        }
        Ok(())
    }

    /// Reconcile caches and become ready. On failure every store is reset.
    pub async fn activate(&self) -> SyncResult<()> {
        info!(generation = self.id, "Activating");
        self.dispatch(Event::Activate).await
    }

    pub async fn message(&self, signal: Signal) -> SyncResult<()> {
        debug!(generation = self.id, %signal, "Control message");
        self.dispatch(Event::Message(signal)).await
    }

    pub async fn prefetch_remainder(&self) -> SyncResult<()> {
        self.message(Signal::PrefetchRemainder).await
    }

    /// Router over this generation's content cache, once ready.
    pub fn router(&self) -> Option<Router> {
        if self.phase() != Phase::Ready {
            return None;
        }
        self.content.get().map(|content| {
            Router::new(
                self.ctx.origin.clone(),
                Arc::clone(&self.ctx.bundle),
                content.clone(),
                Arc::clone(&self.ctx.fetcher),
            )
        })
    }

    pub async fn status(&self) -> SyncResult<GenerationStatus> {
        let content_urls = self.ctx.storage.store(CONTENT_STORE).keys().await?;
        let snapshot_age = match ManifestSnapshot::entry(&self.ctx.storage).await {
            Ok(entry) => entry.map(|e| e.age_display()),
            Err(e) => {
                warn!(error = %e, "Failed to read snapshot for status");
                None
            }
        };
        Ok(GenerationStatus {
            id: self.id,
            phase: self.phase(),
            manifest_entries: self.ctx.bundle.manifest().len(),
            content_entries: content_urls.len(),
            snapshot_age,
            missing: missing_keys(self.ctx.bundle.manifest(), &self.ctx.origin, &content_urls),
        })
    }

    /// Run an event and every follow-up event through the state machine,
    /// executing effects in order.
    async fn dispatch(&self, event: Event) -> SyncResult<()> {
        let mut queue = VecDeque::from([event]);
        let mut outcome = Ok(());

        while let Some(event) = queue.pop_front() {
            let before = self.state();
            let label = event_label(&event);
            let Transition { state, effects } =
                transition(before, event, &self.ctx.bundle, &self.ctx.origin);
            if state == before && effects.is_empty() {
                debug!(generation = self.id, phase = %before.phase, event = label, "Event ignored");
            }
            self.set_state(state);

            for effect in effects {
                match self.apply(effect).await {
                    Ok(Some(next)) => queue.push_back(next),
                    Ok(None) => {}
                    // Keep resetting the remaining stores
                    Err(e) if state.phase == Phase::Failed => {
                        error!(generation = self.id, error = %e, "Failed to reset cache store");
                    }
                    Err(e) => {
                        if let Some(next) = self.on_effect_failure(state.phase, &e) {
                            queue.clear();
                            queue.push_back(next);
                        }
                        outcome = Err(self.wrap_failure(state.phase, e));
                        break;
                    }
                }
            }
        }

        outcome
    }

    fn on_effect_failure(&self, phase: Phase, error: &SyncError) -> Option<Event> {
        match phase {
            Phase::Installing => {
                warn!(generation = self.id, error = %error, "Install failed");
                Some(Event::CoreFailed(error.to_string()))
            }
            Phase::Activating => {
                // Cache state is indeterminate; reset everything
                error!(generation = self.id, error = %error, "Failed to activate generation, resetting caches");
                Some(Event::ActivationFailed(error.to_string()))
            }
            Phase::Installed | Phase::Ready | Phase::Failed => {
                warn!(generation = self.id, phase = %phase, error = %error, "Lifecycle effect failed");
                None
            }
        }
    }

    fn wrap_failure(&self, phase: Phase, error: SyncError) -> SyncError {
        match phase {
            Phase::Installing => SyncError::InstallFailed(error.to_string()),
            Phase::Activating => SyncError::ActivationFailed(error.to_string()),
            _ => error,
        }
    }

    async fn apply(&self, effect: Effect) -> SyncResult<Option<Event>> {
        let storage = &self.ctx.storage;

        match effect {
            Effect::StageCore { keys } => {
                let urls = self.ctx.urls_for(&keys)?;
                let staged = add_all(
                    &storage.store(STAGING_STORE),
                    self.ctx.fetcher.as_ref(),
                    &urls,
                    FetchMode::Reload,
                )
                .await?;
                debug!(generation = self.id, staged, "Core resources staged");
                Ok(None)
            }
            Effect::ReadReconcileInputs => {
                let prior = ManifestSnapshot::load(storage).await?;
                let content_urls = storage.store(CONTENT_STORE).keys().await?;
                debug!(
                    generation = self.id,
                    first_activation = prior.is_none(),
                    content = content_urls.len(),
                    "Reconciling caches"
                );
                Ok(Some(Event::Reconcile {
                    prior,
                    content_urls,
                }))
            }
            Effect::DropStore(name) => {
                storage.delete(name).await?;
                Ok(None)
            }
            Effect::Evict { urls } => {
                let content = storage.store(CONTENT_STORE);
                for url in &urls {
                    content.delete(url).await?;
                }
                debug!(generation = self.id, evicted = urls.len(), "Evicted stale entries");
                Ok(None)
            }
            Effect::PromoteStaging => {
                let staging = storage.store(STAGING_STORE);
                let content = storage.store(CONTENT_STORE);
                for key in staging.keys().await? {
                    if let Some(response) = staging.get(&key).await? {
                        content.put(&key, &response).await?;
                    }
                }
                Ok(None)
            }
            Effect::PersistSnapshot => {
                ManifestSnapshot::save(storage, self.ctx.bundle.manifest()).await?;
                Ok(None)
            }
            Effect::Claim => {
                if self.content.set(storage.store(CONTENT_STORE)).is_err() {
                    debug!(generation = self.id, "Content cache already claimed");
                }
                info!(generation = self.id, "Generation active");
                Ok(None)
            }
            Effect::RequestSkipWaiting => {
                debug!(generation = self.id, "Skip waiting requested");
                Ok(None)
            }
            Effect::ScanContent => {
                let content_urls = storage.store(CONTENT_STORE).keys().await?;
                Ok(Some(Event::ContentScanned { content_urls }))
            }
            Effect::FillContent { keys } => {
                let urls = self.ctx.urls_for(&keys)?;
                let content = self.content.get().cloned().unwrap_or_else(|| storage.store(CONTENT_STORE));
                let added = add_all(&content, self.ctx.fetcher.as_ref(), &urls, FetchMode::Default).await?;
                info!(generation = self.id, added, "Prefetched remaining resources");
                Ok(None)
            }
            Effect::Emit(event) => Ok(Some(event)),
        }
    }
}

fn event_label(event: &Event) -> &'static str {
    match event {
        Event::Install => "install",
        Event::CoreStaged => "core-staged",
        Event::CoreFailed(_) => "core-failed",
        Event::Activate => "activate",
        Event::Reconcile { .. } => "reconcile",
        Event::Reconciled => "reconciled",
        Event::ActivationFailed(_) => "activation-failed",
        Event::Message(signal) => signal.as_str(),
        Event::ContentScanned { .. } => "content-scanned",
    }
}
