//! Per-organization connection registry with fan-out broadcast.
//!
//! The registry is owned by a single dispatch task. Every caller talks to it
//! through [`Hub`], which only sends commands over a channel, so register,
//! unregister and broadcast are applied in one total order and the map itself
//! never needs a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::BroadcastEvent;
use crate::models::{OrgId, UserId};

/// Errors returned by [`Hub`] calls.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub dispatch loop is not running")]
    Closed,
    #[error("hub command queue is full, event dropped")]
    Saturated,
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Identifies one registered session and the bucket it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub id: Uuid,
    pub organization_id: OrgId,
}

impl SessionKey {
    pub fn new(organization_id: OrgId) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
        }
    }
}

/// The hub's side of a session: the sending half of its outbound queue.
///
/// The hub holds the only sender, so dropping the handle closes the queue and
/// tells the session's delivery pump to shut the transport.
#[derive(Debug)]
pub struct SessionHandle {
    pub key: SessionKey,
    pub user_id: UserId,
    pub connected_at: Instant,
    tx: mpsc::Sender<Arc<str>>,
}

impl SessionHandle {
    pub fn new(key: SessionKey, user_id: UserId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            key,
            user_id,
            connected_at: Instant::now(),
            tx,
        }
    }
}

/// Snapshot of registry size, answered by the dispatch task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub organizations: usize,
    pub connections: usize,
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

enum Command {
    Register(SessionHandle),
    Unregister(SessionKey),
    Broadcast {
        organization_id: OrgId,
        kind: &'static str,
        payload: Arc<str>,
    },
    Stats(oneshot::Sender<HubStats>),
    OrganizationCount(OrgId, oneshot::Sender<usize>),
    Shutdown,
}

/// Cloneable handle to the dispatch task.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<Command>,
}

impl Hub {
    /// Spawn the dispatch task and return a handle to it.
    pub fn spawn(channel_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let task = tokio::spawn(run(rx));
        (Self { tx }, task)
    }

    /// Add a session to its organization's bucket.
    pub async fn register(&self, session: SessionHandle) -> Result<(), HubError> {
        self.tx
            .send(Command::Register(session))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Remove a session and close its queue. Unknown keys are ignored.
    pub async fn unregister(&self, key: SessionKey) -> Result<(), HubError> {
        self.tx
            .send(Command::Unregister(key))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Queue an event for every live session of `organization_id`.
    ///
    /// Never waits: if the dispatch queue is full the event is dropped and
    /// [`HubError::Saturated`] is returned.
    pub fn broadcast_to_organization(
        &self,
        organization_id: OrgId,
        event: &BroadcastEvent,
    ) -> Result<(), HubError> {
        let payload: Arc<str> = serde_json::to_string(event)?.into();
        self.tx
            .try_send(Command::Broadcast {
                organization_id,
                kind: event.kind(),
                payload,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HubError::Saturated,
                mpsc::error::TrySendError::Closed(_) => HubError::Closed,
            })
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stats(reply))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Number of live sessions of one organization.
    pub async fn organization_connection_count(
        &self,
        organization_id: OrgId,
    ) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::OrganizationCount(organization_id, reply))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Stop the dispatch task, closing every session queue.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| HubError::Closed)
    }
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut registry = Registry::default();
    debug!("hub dispatch loop started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Register(session) => registry.register(session),
            Command::Unregister(key) => {
                registry.unregister(&key);
            }
            Command::Broadcast {
                organization_id,
                kind,
                payload,
            } => {
                let delivery = registry.broadcast(organization_id, &payload);
                debug!(
                    org_id = organization_id,
                    kind,
                    delivered = delivery.delivered,
                    dropped = delivery.dropped,
                    "broadcast event"
                );
            }
            Command::Stats(reply) => {
                let _ = reply.send(registry.stats());
            }
            Command::OrganizationCount(organization_id, reply) => {
                let _ = reply.send(registry.organization_len(organization_id));
            }
            Command::Shutdown => break,
        }
    }

    let stats = registry.stats();
    info!(
        connections = stats.connections,
        "hub dispatch loop stopped, closing sessions"
    );
}

/// The organization → sessions map. Only the dispatch task touches it.
#[derive(Default)]
struct Registry {
    organizations: HashMap<OrgId, HashMap<Uuid, SessionHandle>>,
}

impl Registry {
    fn register(&mut self, session: SessionHandle) {
        let key = session.key;
        let bucket = self.organizations.entry(key.organization_id).or_default();
        if bucket.contains_key(&key.id) {
            warn!(org_id = key.organization_id, session_id = %key.id, "session already registered");
            return;
        }
        debug!(
            org_id = key.organization_id,
            session_id = %key.id,
            user_id = session.user_id,
            "session registered"
        );
        bucket.insert(key.id, session);
    }

    /// Returns the removed handle; dropping it closes the session queue.
    fn unregister(&mut self, key: &SessionKey) -> Option<SessionHandle> {
        let bucket = self.organizations.get_mut(&key.organization_id)?;
        let removed = bucket.remove(&key.id);
        if bucket.is_empty() {
            self.organizations.remove(&key.organization_id);
        }
        if let Some(session) = &removed {
            debug!(
                org_id = key.organization_id,
                session_id = %key.id,
                connected_secs = session.connected_at.elapsed().as_secs(),
                "session unregistered"
            );
        }
        removed
    }

    fn broadcast(&mut self, organization_id: OrgId, payload: &Arc<str>) -> Delivery {
        let mut delivery = Delivery::default();
        let Some(bucket) = self.organizations.get_mut(&organization_id) else {
            return delivery;
        };

        bucket.retain(|id, session| match session.tx.try_send(Arc::clone(payload)) {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    org_id = organization_id,
                    session_id = %id,
                    "outbound queue full, dropping session"
                );
                delivery.dropped += 1;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(org_id = organization_id, session_id = %id, "session queue closed");
                delivery.dropped += 1;
                false
            }
        });

        if bucket.is_empty() {
            self.organizations.remove(&organization_id);
        }
        delivery
    }

    fn organization_len(&self, organization_id: OrgId) -> usize {
        self.organizations
            .get(&organization_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn stats(&self) -> HubStats {
        HubStats {
            organizations: self.organizations.len(),
            connections: self.organizations.values().map(HashMap::len).sum(),
        }
    }
}
