//! # twin_core — Cluster node
//!
//! One node of the digital-twin cluster. It owns the entities the placement
//! oracle assigns to it, forwards events for every other entity to the peer
//! that owns it, and re-runs registered mappers whenever an owned entity
//! changes.
//!
//! ## Startup Sequence
//!
//! 1. Connect to NATS (`--nats-url`, else `NATS_URL`, else localhost).
//! 2. Track cluster membership and answer snapshot requests.
//! 3. Start the routing proxy from the membership snapshot and change feed.
//! 4. Follow the mapper registry feed.
//! 5. Serve forwarded events on `twin.proxy.route.<name>` and announce the
//!    node.
//!
//! On Ctrl-C the node withdraws from the cluster and exits.

mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use twin_net::NatsConnection;
use twin_runtime::environment::watch_registry;
use twin_runtime::{
    Connector, NatsConnector, NatsResolver, RouteServer, RuntimeConfig, RuntimeContext,
    StateManager,
};

use state::EntityState;

#[derive(Parser)]
#[command(name = "twin-core", about = "Digital-twin cluster node over NATS")]
struct Args {
    /// Node name, unique within the cluster
    #[arg(short, long)]
    name: String,

    /// Application the node serves
    #[arg(long, default_value = "core")]
    app_id: String,

    /// Host advertised to peers
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port advertised to peers
    #[arg(long, default_value_t = 4222)]
    port: u16,

    /// NATS server URL
    #[arg(long)]
    nats_url: Option<String>,

    /// Bound on dialing a peer, in milliseconds
    #[arg(long, default_value_t = 3000)]
    dial_timeout_ms: u64,

    /// Bound on a forwarded event's round trip, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    call_timeout_ms: u64,

    /// Nodes entities are placed on (comma separated); empty keeps every
    /// entity local
    #[arg(long, value_delimiter = ',')]
    placement_nodes: Vec<String>,

    /// Dial each peer's advertised address instead of reusing this node's
    /// connection
    #[arg(long)]
    dedicated_connections: bool,
}

impl Args {
    fn config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::new(&self.name)
            .with_app_id(&self.app_id)
            .with_advertise(&self.host, self.port)
            .with_dial_timeout(Duration::from_millis(self.dial_timeout_ms))
            .with_call_timeout(Duration::from_millis(self.call_timeout_ms))
            .with_placement_nodes(self.placement_nodes.iter().cloned());
        if let Some(url) = &self.nats_url {
            config = config.with_nats_url(url);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("twin_core=info".parse()?)
                .add_directive("twin_runtime=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.config();
    info!(node = %config.name, app_id = %config.app_id, "twin node starting");

    let url = config.nats_url();
    info!(%url, "connecting to NATS");
    let conn = NatsConnection::connect_to(&url).await?;
    info!("connected to NATS");

    let context = Arc::new(RuntimeContext::new(config));
    let resolver = Arc::new(NatsResolver::new(
        conn.clone(),
        context.config().service_info(),
    ));
    let membership = resolver.serve().await?;

    let connector: Arc<dyn Connector> = if args.dedicated_connections {
        Arc::new(NatsConnector::Dedicated)
    } else {
        Arc::new(NatsConnector::shared(conn.clone()))
    };
    let state: Arc<dyn StateManager> = Arc::new(EntityState::new(Arc::downgrade(&context)));
    let proxy = context
        .start(connector, state, resolver.clone())
        .await?;

    let registry = watch_registry(&conn, Arc::clone(context.environment())).await?;

    let server = tokio::spawn(RouteServer::new(conn.clone(), Arc::clone(&proxy)).run());
    resolver.announce().await?;
    info!(node = %context.config().name, "twin node ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
        }
        result = server => {
            match result {
                Ok(Ok(())) => info!("route server exited"),
                Ok(Err(e)) => error!(%e, "route server failed"),
                Err(e) => error!(%e, "route server task panicked"),
            }
        }
    }

    if let Err(e) = resolver.withdraw().await {
        error!(%e, "failed to withdraw from the cluster");
    }
    registry.abort();
    membership.abort();
    conn.client().flush().await?;

    info!("twin node shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_onto_config() {
        let args = Args::parse_from([
            "twin-core",
            "--name",
            "node-b",
            "--port",
            "5000",
            "--call-timeout-ms",
            "250",
            "--placement-nodes",
            "node-a,node-b",
        ]);
        let config = args.config();
        assert_eq!(config.name, "node-b");
        assert_eq!(config.app_id, "core");
        assert_eq!(config.port, 5000);
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.placement_nodes, ["node-a", "node-b"]);
        assert!(config.nats_url.is_none());
        assert!(!args.dedicated_connections);
    }
}
