//! Wire types exchanged between cluster nodes.
//!
//! All message types derive `Serialize` and `Deserialize` for MessagePack
//! transport. Event bodies travel as opaque bytes inside [`RouteRequest`];
//! their format is the runtime's business.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Routing ─────────────────────────────────────────────────────────────────

/// An event forwarded to the node that owns its target entity. Sent as a
/// request on [`subjects::proxy_route`](crate::subjects::proxy_route).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Event attributes, including the `entityid` extension.
    pub header: BTreeMap<String, String>,
    /// Raw event body.
    pub data: Vec<u8>,
}

/// Reply to a [`RouteRequest`]. `error` is set when the owning node failed
/// to handle the event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub error: Option<String>,
}

impl RouteResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self { error: None }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ── Discovery ───────────────────────────────────────────────────────────────

/// One member of the cluster as advertised through discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Node name; the placement oracle's answer space.
    pub name: String,
    /// Application the node belongs to.
    pub app_id: String,
    /// Advertised host of the node's NATS endpoint.
    pub host: String,
    /// Advertised port of the node's NATS endpoint.
    pub port: u16,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInfo {
    /// The NATS URL a dedicated connection to this peer dials.
    #[must_use]
    pub fn address(&self) -> String {
        format!("nats://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipKind {
    Join,
    Update,
    Leave,
}

/// A membership change published on
/// [`subjects::DISCOVERY_EVENTS`](crate::subjects::DISCOVERY_EVENTS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub kind: MembershipKind,
    pub service: ServiceInfo,
}

impl MembershipEvent {
    #[must_use]
    pub fn join(service: ServiceInfo) -> Self {
        Self {
            kind: MembershipKind::Join,
            service,
        }
    }

    #[must_use]
    pub fn update(service: ServiceInfo) -> Self {
        Self {
            kind: MembershipKind::Update,
            service,
        }
    }

    #[must_use]
    pub fn leave(service: ServiceInfo) -> Self {
        Self {
            kind: MembershipKind::Leave,
            service,
        }
    }
}

/// Request body on
/// [`subjects::DISCOVERY_SNAPSHOT`](crate::subjects::DISCOVERY_SNAPSHOT).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// Name of the asking node, for logging on the responder.
    pub requester: String,
}

/// Reply to a [`SnapshotRequest`]: every member the responder knows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub services: Vec<ServiceInfo>,
}

// ── Mapper registry ─────────────────────────────────────────────────────────

/// A registry entry: a mapper key and its TQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    /// `{category}.{qualifier}.{entity_id}.{mapper_name}`
    pub key: String,
    /// UTF-8 TQL text.
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One batch from the registry change feed on
/// [`subjects::REGISTRY_MAPPERS`](crate::subjects::REGISTRY_MAPPERS).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapperUpdate {
    #[serde(default)]
    pub puts: Vec<KvPair>,
    /// Keys whose mappers were deleted.
    #[serde(default)]
    pub deletes: Vec<String>,
}
