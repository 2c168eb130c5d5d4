//! Event host.
//!
//! Runs a `Registry` on a single tokio task and feeds it lifecycle events
//! from an mpsc channel, one at a time and in arrival order. Callers talk to
//! it through a cloneable `HostHandle` and get replies on oneshot channels.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::lifecycle::Signal;
use crate::manifest::ManifestBundle;
use crate::registry::{Registry, RegistryStatus};
use crate::router::Request;
use crate::store::CachedResponse;

/// Buffer size for the event channel.
/// Enough to absorb a burst of intercepted requests without blocking senders.
const CHANNEL_BUFFER_SIZE: usize = 64;

pub enum HostEvent {
    Deploy {
        bundle: ManifestBundle,
        reply: oneshot::Sender<SyncResult<u64>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<SyncResult<Option<CachedResponse>>>,
    },
    Message {
        signal: Signal,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    ClientsReleased {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Status {
        reply: oneshot::Sender<SyncResult<RegistryStatus>>,
    },
}

pub struct Host;

impl Host {
    /// Start the event loop. It stops once every handle is dropped and
    /// hands the registry back through the join handle.
    pub fn spawn(registry: Registry) -> (HostHandle, JoinHandle<Registry>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let task = tokio::spawn(Self::run(registry, rx));
        (HostHandle { tx }, task)
    }

    async fn run(mut registry: Registry, mut rx: mpsc::Receiver<HostEvent>) -> Registry {
        info!(origin = %registry.origin(), "Event host started");

        while let Some(event) = rx.recv().await {
            match event {
                HostEvent::Deploy { bundle, reply } => {
                    let result = registry.deploy(bundle).await.map(|g| g.id());
                    if let Err(e) = &result {
                        error!(error = %e, "Deployment failed");
                    }
                    Self::send_reply(reply, result);
                }
                HostEvent::Fetch { request, reply } => {
                    Self::send_reply(reply, registry.handle(&request).await);
                }
                HostEvent::Message { signal, reply } => {
                    Self::send_reply(reply, registry.message(signal).await);
                }
                HostEvent::ClientsReleased { reply } => {
                    Self::send_reply(reply, registry.clients_released().await);
                }
                HostEvent::Status { reply } => {
                    Self::send_reply(reply, registry.status().await);
                }
            }
        }

        info!("Event host stopped");
        registry
    }

    /// Helper to send replies, logging when the caller has gone away
    fn send_reply<T>(reply: oneshot::Sender<T>, value: T) {
        if reply.send(value).is_err() {
            debug!("Reply dropped - caller no longer waiting");
        }
    }
}

#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostEvent>,
}

impl HostHandle {
    async fn call<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<SyncResult<T>>) -> HostEvent,
    ) -> SyncResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(event(reply))
            .await
            .map_err(|_| SyncError::HostClosed)?;
        rx.await.map_err(|_| SyncError::HostClosed)?
    }

    /// Returns the id of the new generation.
    pub async fn deploy(&self, bundle: ManifestBundle) -> SyncResult<u64> {
        self.call(|reply| HostEvent::Deploy { bundle, reply }).await
    }

    pub async fn fetch(&self, request: Request) -> SyncResult<Option<CachedResponse>> {
        self.call(|reply| HostEvent::Fetch { request, reply }).await
    }

    pub async fn message(&self, signal: Signal) -> SyncResult<()> {
        self.call(|reply| HostEvent::Message { signal, reply }).await
    }

    pub async fn clients_released(&self) -> SyncResult<()> {
        self.call(|reply| HostEvent::ClientsReleased { reply }).await
    }

    pub async fn status(&self) -> SyncResult<RegistryStatus> {
        self.call(|reply| HostEvent::Status { reply }).await
    }
}
