//! Cluster membership.
//!
//! A [`Resolver`] provides the current member list and a feed of subsequent
//! changes. [`NatsResolver`] is the production provider: every node announces
//! itself on [`DISCOVERY_EVENTS`], tracks the events it sees, and answers
//! snapshot requests on [`DISCOVERY_SNAPSHOT`] with its view, so a joining
//! node can ask any live peer. [`MemoryResolver`] is an in-process provider
//! driven by hand.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twin_net::messages::{
    MembershipEvent, MembershipKind, ServiceInfo, ServiceSnapshot, SnapshotRequest,
};
use twin_net::subjects::{DISCOVERY_EVENTS, DISCOVERY_SNAPSHOT};
use twin_net::{NatsConnection, NetError};

use crate::error::DiscoveryError;

/// Default bound on waiting for a peer's snapshot reply.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Every member currently known.
    async fn snapshot(&self) -> Result<Vec<ServiceInfo>, DiscoveryError>;

    /// Membership changes from now on.
    async fn watch(&self) -> Result<BoxStream<'static, MembershipEvent>, DiscoveryError>;
}

type Members = Arc<Mutex<BTreeMap<String, ServiceInfo>>>;

fn apply_event(members: &Members, event: &MembershipEvent) {
    let mut members = members.lock().unwrap_or_else(PoisonError::into_inner);
    match event.kind {
        MembershipKind::Join | MembershipKind::Update => {
            members.insert(event.service.name.clone(), event.service.clone());
        }
        MembershipKind::Leave => {
            members.remove(&event.service.name);
        }
    }
}

fn list(members: &Members) -> Vec<ServiceInfo> {
    members
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect()
}

/// The answer to a snapshot request. A node leaves its own requests to its
/// peers, since its view is empty until they answer.
fn snapshot_reply(members: &Members, local: &str, payload: &[u8]) -> Option<ServiceSnapshot> {
    match twin_net::decode::<SnapshotRequest>(payload) {
        Ok(request) if request.requester == local => None,
        Ok(request) => {
            debug!(node = %local, requester = %request.requester, "snapshot requested");
            Some(ServiceSnapshot {
                services: list(members),
            })
        }
        Err(e) => {
            warn!(%e, "dropping malformed snapshot request");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// NATS
// ---------------------------------------------------------------------------

pub struct NatsResolver {
    conn: NatsConnection,
    local: ServiceInfo,
    members: Members,
    snapshot_timeout: Duration,
}

impl NatsResolver {
    #[must_use]
    pub fn new(conn: NatsConnection, local: ServiceInfo) -> Self {
        Self {
            conn,
            local,
            members: Arc::default(),
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    /// Start tracking membership and answering snapshot requests.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Net`] if either subscription fails.
    pub async fn serve(&self) -> Result<JoinHandle<()>, DiscoveryError> {
        let mut events = self.conn.subscribe(DISCOVERY_EVENTS).await?;
        let mut requests = self.conn.subscribe(DISCOVERY_SNAPSHOT).await?;
        apply_event(&self.members, &MembershipEvent::join(self.local.clone()));

        let conn = self.conn.clone();
        let members = Arc::clone(&self.members);
        let local = self.local.name.clone();
        info!(node = %local, "serving membership snapshots");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = events.next() => {
                        let Some(msg) = msg else { break };
                        match twin_net::decode::<MembershipEvent>(&msg.payload) {
                            Ok(event) => apply_event(&members, &event),
                            Err(e) => warn!(%e, "dropping malformed membership event"),
                        }
                    }
                    msg = requests.next() => {
                        let Some(msg) = msg else { break };
                        let Some(reply) = msg.reply else { continue };
                        let Some(snapshot) = snapshot_reply(&members, &local, &msg.payload) else {
                            continue;
                        };
                        if let Err(e) = conn.publish(reply.as_str(), &snapshot).await {
                            warn!(%e, "failed to publish snapshot reply");
                        }
                    }
                }
            }
            info!(node = %local, "membership tracking stopped");
        }))
    }

    /// Publish this node's join.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Net`] if publishing fails.
    pub async fn announce(&self) -> Result<(), DiscoveryError> {
        info!(node = %self.local.name, "announcing membership");
        self.conn
            .publish(DISCOVERY_EVENTS, &MembershipEvent::join(self.local.clone()))
            .await?;
        Ok(())
    }

    /// Publish this node's departure.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Net`] if publishing fails.
    pub async fn withdraw(&self) -> Result<(), DiscoveryError> {
        info!(node = %self.local.name, "withdrawing membership");
        self.conn
            .publish(DISCOVERY_EVENTS, &MembershipEvent::leave(self.local.clone()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Resolver for NatsResolver {
    async fn snapshot(&self) -> Result<Vec<ServiceInfo>, DiscoveryError> {
        let request = SnapshotRequest {
            requester: self.local.name.clone(),
        };
        match self
            .conn
            .request_within::<_, ServiceSnapshot>(DISCOVERY_SNAPSHOT, &request, self.snapshot_timeout)
            .await
        {
            Ok(snapshot) => {
                for service in &snapshot.services {
                    apply_event(&self.members, &MembershipEvent::join(service.clone()));
                }
                Ok(snapshot.services)
            }
            // First node up: nobody to ask.
            Err(NetError::NoResponders(_)) => Ok(Vec::new()),
            // Only this node is subscribed, and it never answers itself.
            Err(NetError::Timeout) => {
                warn!(node = %self.local.name, "no peer answered the snapshot request");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn watch(&self) -> Result<BoxStream<'static, MembershipEvent>, DiscoveryError> {
        let sub = self.conn.subscribe(DISCOVERY_EVENTS).await?;
        Ok(sub
            .filter_map(|msg| async move {
                match twin_net::decode::<MembershipEvent>(&msg.payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(%e, "dropping malformed membership event");
                        None
                    }
                }
            })
            .boxed())
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// A resolver fed through [`MemoryResolver::publish`]. Its change feed has a
/// single consumer.
pub struct MemoryResolver {
    members: Members,
    tx: mpsc::UnboundedSender<MembershipEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<MembershipEvent>>>,
}

impl MemoryResolver {
    #[must_use]
    pub fn new<I>(members: I) -> Self
    where
        I: IntoIterator<Item = ServiceInfo>,
    {
        let (tx, rx) = mpsc::unbounded();
        let members = members
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect::<BTreeMap<_, _>>();
        Self {
            members: Arc::new(Mutex::new(members)),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Record a change and deliver it to the watcher, if any.
    pub fn publish(&self, event: MembershipEvent) {
        apply_event(&self.members, &event);
        if self.tx.unbounded_send(event).is_err() {
            debug!("membership watcher gone");
        }
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    async fn snapshot(&self) -> Result<Vec<ServiceInfo>, DiscoveryError> {
        Ok(list(&self.members))
    }

    async fn watch(&self) -> Result<BoxStream<'static, MembershipEvent>, DiscoveryError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DiscoveryError::AlreadyWatching)?;
        Ok(rx.boxed())
    }
}
