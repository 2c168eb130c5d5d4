//! Pure lifecycle transitions.
//!
//! `transition` maps `(State, Event)` to the next state and the effects to
//! perform. It never touches the network or the stores; `Generation` runs the
//! effects and feeds observations back in as events.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::manifest::{Manifest, ManifestBundle};
use crate::origin::Origin;
use crate::store::{CONTENT_STORE, SNAPSHOT_STORE, STAGING_STORE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fetching the core set into staging
    Installing,
    /// Core set staged, waiting to be allowed to activate
    Installed,
    /// Reconciling staging, content and the two manifests
    Activating,
    /// Serving requests
    Ready,
    /// Activation failed and all stores were reset
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// External control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Activate now instead of waiting for the current generation to go away
    SkipWait,
    /// Fetch every manifest resource not yet in the content cache
    PrefetchRemainder,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SkipWait => "skip-wait",
            Self::PrefetchRemainder => "prefetch-remainder",
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "skip-wait" => Ok(Self::SkipWait),
            "prefetch-remainder" => Ok(Self::PrefetchRemainder),
            other => Err(format!("unrecognized signal: {}", other)),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub phase: Phase,
    pub skip_waiting: bool,
}

impl State {
    pub fn new(skip_waiting: bool) -> Self {
        Self {
            phase: Phase::Installing,
            skip_waiting,
        }
    }

    pub fn ready() -> Self {
        Self {
            phase: Phase::Ready,
            skip_waiting: false,
        }
    }

    fn with_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Install,
    /// Every core resource is in staging
    CoreStaged,
    CoreFailed(String),
    Activate,
    /// Inputs for reconciliation, read from the stores
    Reconcile {
        prior: Option<Manifest>,
        content_urls: Vec<String>,
    },
    /// Every reconciliation effect completed
    Reconciled,
    ActivationFailed(String),
    Message(Signal),
    ContentScanned {
        content_urls: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch these keys with cache bypass into staging, all or nothing
    StageCore { keys: Vec<String> },
    /// Read the snapshot and the content keys, answer with `Event::Reconcile`
    ReadReconcileInputs,
    DropStore(&'static str),
    /// Delete these content entries
    Evict { urls: Vec<String> },
    /// Copy every staging entry into content, overwriting
    PromoteStaging,
    PersistSnapshot,
    /// Become the generation that serves requests
    Claim,
    /// Ask the registry to activate this generation now
    RequestSkipWaiting,
    /// List content keys, answer with `Event::ContentScanned`
    ScanContent,
    /// Fetch these keys into content, all or nothing
    FillContent { keys: Vec<String> },
    /// Feed an event back once the preceding effects succeeded
    Emit(Event),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: State,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(state: State, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    fn stay(state: State) -> Self {
        Self::to(state, Vec::new())
    }
}

/// How activation treats the existing content cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationPlan {
    /// No prior snapshot: start from an empty content cache
    Fresh,
    /// Prior snapshot present: drop only stale or removed entries
    Upgrade { evict: Vec<String> },
}

impl ActivationPlan {
    fn into_effects(self) -> Vec<Effect> {
        let mut effects = match self {
            ActivationPlan::Fresh => vec![Effect::DropStore(CONTENT_STORE)],
            ActivationPlan::Upgrade { evict } if evict.is_empty() => Vec::new(),
            ActivationPlan::Upgrade { evict } => vec![Effect::Evict { urls: evict }],
        };
        effects.extend([
            Effect::PromoteStaging,
            Effect::DropStore(STAGING_STORE),
            Effect::PersistSnapshot,
            Effect::Emit(Event::Reconciled),
        ]);
        effects
    }
}

/// Decide which content entries survive an activation.
///
/// An entry survives only when its key is in the current manifest with the
/// same identifier it had in the prior manifest.
pub fn plan_activation(
    current: &Manifest,
    prior: Option<&Manifest>,
    origin: &Origin,
    content_urls: &[String],
) -> ActivationPlan {
    let Some(prior) = prior else {
        return ActivationPlan::Fresh;
    };

    let evict = content_urls
        .iter()
        .filter(|url| match origin.entry_key(url) {
            Some(key) => !current.is_unchanged_since(prior, &key),
            None => true,
        })
        .cloned()
        .collect();
    ActivationPlan::Upgrade { evict }
}

/// Manifest keys with no entry in the content cache.
pub fn missing_keys(manifest: &Manifest, origin: &Origin, content_urls: &[String]) -> Vec<String> {
    let present: HashSet<String> = content_urls
        .iter()
        .filter_map(|url| origin.entry_key(url))
        .collect();
    manifest
        .missing_from(&present)
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn transition(
    state: State,
    event: Event,
    bundle: &ManifestBundle,
    origin: &Origin,
) -> Transition {
    use Phase::*;

    match (state.phase, event) {
        (Installing, Event::Install) => Transition::to(
            state,
            vec![
                Effect::StageCore {
                    keys: bundle.core().to_vec(),
                },
                Effect::Emit(Event::CoreStaged),
            ],
        ),
        (Installing, Event::CoreStaged) => Transition::stay(state.with_phase(Installed)),
        // Stays installing; only a fresh deployment retries
        (Installing, Event::CoreFailed(_)) => Transition::stay(state),

        (Installed, Event::Activate) => Transition::to(
            state.with_phase(Activating),
            vec![Effect::ReadReconcileInputs],
        ),
        (Activating, Event::Reconcile { prior, content_urls }) => {
            let plan = plan_activation(bundle.manifest(), prior.as_ref(), origin, &content_urls);
            Transition::to(state, plan.into_effects())
        }
        (Activating, Event::Reconciled) => {
            Transition::to(state.with_phase(Ready), vec![Effect::Claim])
        }
        (Activating, Event::ActivationFailed(_)) => Transition::to(
            state.with_phase(Failed),
            vec![
                Effect::DropStore(CONTENT_STORE),
                Effect::DropStore(STAGING_STORE),
                Effect::DropStore(SNAPSHOT_STORE),
            ],
        ),

        (Installing | Installed, Event::Message(Signal::SkipWait)) => Transition::to(
            State {
                skip_waiting: true,
                ..state
            },
            vec![Effect::RequestSkipWaiting],
        ),
        (Ready, Event::Message(Signal::PrefetchRemainder)) => {
            Transition::to(state, vec![Effect::ScanContent])
        }
        (Ready, Event::ContentScanned { content_urls }) => {
            let keys = missing_keys(bundle.manifest(), origin, &content_urls);
            if keys.is_empty() {
                Transition::stay(state)
            } else {
                Transition::to(state, vec![Effect::FillContent { keys }])
            }
        }

        _ => Transition::stay(state),
    }
}
