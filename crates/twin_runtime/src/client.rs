//! Peer connections.
//!
//! The proxy forwards events through a [`ProxyClient`] obtained from a
//! [`Connector`]. The NATS implementations send each event as a request on
//! the peer's [`proxy_route`](twin_net::subjects::proxy_route) subject, either
//! over the node's own connection or over a dedicated connection to the
//! address the peer advertised.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use twin_net::messages::{RouteRequest, RouteResponse, ServiceInfo};
use twin_net::{NatsConnection, NetError, subjects};

/// An established channel to one peer.
#[async_trait]
pub trait ProxyClient: Send + Sync {
    async fn route(&self, request: RouteRequest) -> Result<RouteResponse, NetError>;
}

/// Dials peers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, service: &ServiceInfo) -> Result<Arc<dyn ProxyClient>, NetError>;
}

/// Forwards events to one peer over NATS request/reply.
#[derive(Debug, Clone)]
pub struct NatsProxyClient {
    conn: NatsConnection,
    subject: String,
}

impl NatsProxyClient {
    #[must_use]
    pub fn new(conn: NatsConnection, node_name: &str) -> Self {
        Self {
            conn,
            subject: subjects::proxy_route(node_name),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl ProxyClient for NatsProxyClient {
    async fn route(&self, request: RouteRequest) -> Result<RouteResponse, NetError> {
        self.conn.request(&self.subject, &request).await
    }
}

#[derive(Debug, Clone)]
pub enum NatsConnector {
    /// Reuse the node's connection; peers share one NATS deployment.
    Shared(NatsConnection),
    /// Open a connection to each peer's advertised address.
    Dedicated,
}

impl NatsConnector {
    #[must_use]
    pub fn shared(conn: NatsConnection) -> Self {
        Self::Shared(conn)
    }
}

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(&self, service: &ServiceInfo) -> Result<Arc<dyn ProxyClient>, NetError> {
        let conn = match self {
            Self::Shared(conn) => conn.clone(),
            Self::Dedicated => NatsConnection::connect_to(&service.address()).await?,
        };
        debug!(node = %service.name, "peer client ready");
        Ok(Arc::new(NatsProxyClient::new(conn, &service.name)))
    }
}
