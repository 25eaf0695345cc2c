//! Runtime error types.

use twin_net::NetError;
use twin_tql::TqlError;

/// Errors raised while routing an event to its owning node.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The event carries no `entityid` extension attribute.
    #[error("event has no entityid attribute")]
    MissingEntityId,

    /// The event body could not be parsed for local delivery.
    #[error("malformed event: {0}")]
    ParseEvent(String),

    /// Placement chose a node that is not in the service directory.
    #[error("node '{0}' does not exist")]
    NodeNotExist(String),

    /// Establishing a connection to the peer failed or timed out.
    #[error("failed to dial node '{node}': {source}")]
    Dial {
        node: String,
        #[source]
        source: NetError,
    },

    /// The peer did not answer within the call timeout.
    #[error("routing to node '{node}' timed out")]
    Timeout { node: String },

    /// The peer received the event and reported a failure.
    #[error("node '{node}' failed to handle event: {message}")]
    Remote { node: String, message: String },

    /// The transport failed after the connection was established.
    #[error("transport error towards node '{node}': {source}")]
    Transport {
        node: String,
        #[source]
        source: NetError,
    },

    /// The local state manager rejected the event.
    #[error("local state manager: {0:#}")]
    Local(anyhow::Error),
}

/// Errors raised by the runtime context.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The proxy was requested before the node finished starting.
    #[error("server not ready")]
    ServerNotReady,

    /// `start` was called twice.
    #[error("runtime already started")]
    AlreadyStarted,
}

/// Errors raised by membership providers.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Net(#[from] NetError),

    /// The change feed of a single-consumer resolver was already taken.
    #[error("membership feed already taken")]
    AlreadyWatching,
}

/// Per-entry outcome of storing a mapper declaration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvironmentError {
    /// The key is not `{category}.{qualifier}.{entity_id}.{mapper_name}`.
    #[error("invalid mapper key '{0}'")]
    InvalidKey(String),

    /// The declared value is not UTF-8 text.
    #[error("mapper '{key}' is not valid UTF-8")]
    InvalidUtf8 { key: String },

    /// The TQL text failed to parse.
    #[error("mapper '{key}': {source}")]
    Tql {
        key: String,
        #[source]
        source: TqlError,
    },
}
