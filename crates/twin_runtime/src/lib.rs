//! # twin_runtime
//!
//! Runtime services of a digital-twin cluster node.
//!
//! This crate provides:
//!
//! - [`environment`] — the index of declared mappers, fed from the registry.
//! - [`placement`] — the entity → node oracle.
//! - [`discovery`] — cluster membership snapshots and change feeds.
//! - [`client`] — peer connections used to forward events.
//! - [`proxy`] — the routing proxy that delivers each event to its owner.
//! - [`server`] — the NATS endpoint on which a node accepts forwarded events.
//! - [`propagate`] — re-running mappers when an entity changes.
//! - [`context`] / [`config`] — node configuration and the explicit runtime
//!   context that ties the services together.

pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod event;
pub mod placement;
pub mod propagate;
pub mod proxy;
pub mod server;
pub mod state;

pub use client::{Connector, NatsConnector, NatsProxyClient, ProxyClient};
pub use config::RuntimeConfig;
pub use context::RuntimeContext;
pub use discovery::{MemoryResolver, NatsResolver, Resolver};
pub use environment::{Environment, MapperInfo};
pub use error::{DiscoveryError, EnvironmentError, RouteError, RuntimeError};
pub use event::{Event, MessageContext};
pub use placement::{HashPlacement, Placement, Queue};
pub use propagate::Propagator;
pub use proxy::Proxy;
pub use server::RouteServer;
pub use state::StateManager;
