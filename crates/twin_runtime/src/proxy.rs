//! The cluster routing proxy.
//!
//! [`Proxy::route_message`] delivers an event to the node that owns its
//! entity: locally through the [`StateManager`], or by forwarding it to the
//! owning peer. Peers are tracked in a service directory fed by a
//! [`Resolver`]; connections to them are opened on first use and cached.
//!
//! ## Peer lifecycle
//!
//! ```text
//! unknown --join--> known --first route--> connected
//!    ^                |                        |
//!    +------leave-----+----------leave---------+
//! ```
//!
//! Only successful dials are cached, so a failed dial is retried by the next
//! route. Every membership change stamps the directory entry with a new
//! generation, and a dial is cached only if its peer's generation is the one
//! it was started under. A connection dialed before a leave never survives
//! it, even when the peer rejoins unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use twin_net::NetError;
use twin_net::messages::{MembershipEvent, MembershipKind, ServiceInfo};

use crate::client::{Connector, ProxyClient};
use crate::config::RuntimeConfig;
use crate::discovery::Resolver;
use crate::error::RouteError;
use crate::event::{Event, MessageContext};
use crate::placement::Placement;
use crate::state::StateManager;

struct Member {
    service: ServiceInfo,
    generation: u64,
}

#[derive(Default)]
struct Directory {
    services: HashMap<String, Member>,
    connections: HashMap<String, Arc<dyn ProxyClient>>,
    generation: u64,
}

pub struct Proxy {
    local: ServiceInfo,
    placement: Arc<dyn Placement>,
    connector: Arc<dyn Connector>,
    state_manager: Arc<dyn StateManager>,
    directory: Mutex<Directory>,
    dial_timeout: Duration,
    call_timeout: Duration,
}

impl Proxy {
    /// Create a proxy with an empty directory.
    pub fn new(
        config: &RuntimeConfig,
        placement: Arc<dyn Placement>,
        connector: Arc<dyn Connector>,
        state_manager: Arc<dyn StateManager>,
    ) -> Self {
        Self {
            local: config.service_info(),
            placement,
            connector,
            state_manager,
            directory: Mutex::default(),
            dial_timeout: config.dial_timeout,
            call_timeout: config.call_timeout,
        }
    }

    /// Populate the directory from `resolver` and keep it current.
    ///
    /// The change feed is opened before the snapshot is read so that no
    /// change falls between the two. A failed snapshot is logged and the
    /// proxy starts empty. The watch task ends when the feed closes or the
    /// proxy is dropped.
    pub async fn start(self, resolver: Arc<dyn Resolver>) -> Arc<Self> {
        let proxy = Arc::new(self);

        let feed = match resolver.watch().await {
            Ok(feed) => Some(feed),
            Err(e) => {
                error!(node = %proxy.local.name, error = %e, "membership feed unavailable");
                None
            }
        };

        match resolver.snapshot().await {
            Ok(services) => {
                info!(node = %proxy.local.name, members = services.len(), "membership snapshot loaded");
                for service in services {
                    proxy.handle_service(MembershipEvent::join(service));
                }
            }
            Err(e) => {
                error!(node = %proxy.local.name, error = %e, "membership snapshot failed, starting empty");
            }
        }

        if let Some(mut feed) = feed {
            let weak: Weak<Self> = Arc::downgrade(&proxy);
            tokio::spawn(async move {
                while let Some(event) = feed.next().await {
                    let Some(proxy) = weak.upgrade() else { break };
                    proxy.handle_service(event);
                }
                debug!("membership watch ended");
            });
        }

        proxy
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn local(&self) -> &ServiceInfo {
        &self.local
    }

    /// Apply one membership change. Join and update upsert the service;
    /// an update that moves the service drops its cached connection. Leave
    /// removes the service and its connection.
    pub fn handle_service(&self, event: MembershipEvent) {
        let name = event.service.name.clone();
        let mut dir = self.directory();
        dir.generation += 1;
        let generation = dir.generation;
        match event.kind {
            MembershipKind::Join | MembershipKind::Update => {
                let moved = dir
                    .services
                    .get(&name)
                    .is_some_and(|old| old.service.address() != event.service.address());
                if moved && dir.connections.remove(&name).is_some() {
                    debug!(node = %name, "peer moved, connection dropped");
                }
                dir.services.insert(
                    name.clone(),
                    Member {
                        service: event.service,
                        generation,
                    },
                );
                debug!(node = %name, kind = ?event.kind, "service registered");
            }
            MembershipKind::Leave => {
                dir.services.remove(&name);
                dir.connections.remove(&name);
                debug!(node = %name, "service removed");
            }
        }
    }

    /// Names of every known service.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory().services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a connection to `name` is cached.
    pub fn is_connected(&self, name: &str) -> bool {
        self.directory().connections.contains_key(name)
    }

    /// Route `event` with the configured call timeout.
    ///
    /// # Errors
    ///
    /// See [`route_message_within`](Self::route_message_within).
    pub async fn route_message(&self, event: &Event) -> Result<(), RouteError> {
        self.route_message_within(event, self.call_timeout).await
    }

    /// Route `event` to the node owning its entity, waiting at most
    /// `timeout` for a remote peer.
    ///
    /// # Errors
    ///
    /// - [`RouteError::MissingEntityId`] if the event names no entity.
    /// - [`RouteError::ParseEvent`] or [`RouteError::Local`] for local
    ///   delivery failures.
    /// - [`RouteError::NodeNotExist`], [`RouteError::Dial`],
    ///   [`RouteError::Timeout`], [`RouteError::Transport`] or
    ///   [`RouteError::Remote`] for remote delivery failures.
    pub async fn route_message_within(
        &self,
        event: &Event,
        timeout: Duration,
    ) -> Result<(), RouteError> {
        let entity_id = event.entity_id().ok_or(RouteError::MissingEntityId)?;
        let node = self.placement.select(entity_id).node_name;

        if node == self.local.name {
            debug!(entity_id, event_id = event.id(), "routing locally");
            let ctx = MessageContext::from_event(event)?;
            return self
                .state_manager
                .handle_message(ctx)
                .await
                .map_err(RouteError::Local);
        }

        let client = self.select_conn(&node).await?;
        debug!(entity_id, event_id = event.id(), node = %node, "forwarding event");

        let response = match tokio::time::timeout(timeout, client.route(event.to_request())).await {
            Err(_) | Ok(Err(NetError::Timeout)) => {
                warn!(entity_id, node = %node, "route timed out");
                return Err(RouteError::Timeout { node });
            }
            Ok(Err(source)) => {
                warn!(entity_id, node = %node, error = %source, "route failed");
                return Err(RouteError::Transport { node, source });
            }
            Ok(Ok(response)) => response,
        };

        match response.error {
            None => Ok(()),
            Some(message) => Err(RouteError::Remote { node, message }),
        }
    }

    /// The connection to `name`, dialing it if none is cached.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NodeNotExist`] if `name` is not in the directory
    /// and [`RouteError::Dial`] if dialing fails or exceeds the dial timeout.
    pub async fn select_conn(&self, name: &str) -> Result<Arc<dyn ProxyClient>, RouteError> {
        let (service, generation) = {
            let dir = self.directory();
            if let Some(client) = dir.connections.get(name) {
                return Ok(Arc::clone(client));
            }
            let member = dir
                .services
                .get(name)
                .ok_or_else(|| RouteError::NodeNotExist(name.to_string()))?;
            (member.service.clone(), member.generation)
        };

        info!(node = name, address = %service.address(), "dialing peer");
        let client = match tokio::time::timeout(self.dial_timeout, self.connector.connect(&service))
            .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(source)) => {
                warn!(node = name, error = %source, "dial failed");
                return Err(RouteError::Dial {
                    node: name.to_string(),
                    source,
                });
            }
            Err(_) => {
                warn!(node = name, "dial timed out");
                return Err(RouteError::Dial {
                    node: name.to_string(),
                    source: NetError::Timeout,
                });
            }
        };

        let mut dir = self.directory();
        if dir
            .services
            .get(name)
            .is_some_and(|member| member.generation == generation)
        {
            dir.connections
                .insert(name.to_string(), Arc::clone(&client));
        } else {
            debug!(node = name, "peer changed during dial, connection not cached");
        }
        Ok(client)
    }
}
