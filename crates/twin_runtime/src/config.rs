//! Node configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use twin_net::messages::ServiceInfo;

/// Default bound on establishing a peer connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on a forwarded event's round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one cluster node.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Node name, unique within the cluster (e.g. `"node-a"`).
    pub name: String,
    /// Application the node serves.
    pub app_id: String,
    /// Host advertised to peers.
    pub host: String,
    /// Port advertised to peers.
    pub port: u16,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
    pub dial_timeout: Duration,
    pub call_timeout: Duration,
    /// Nodes the placement oracle distributes entities over. Empty means
    /// this node owns everything.
    pub placement_nodes: Vec<String>,
}

impl RuntimeConfig {
    /// Create a config with defaults for everything but the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_id: "core".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4222,
            nats_url: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            placement_nodes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Set the address peers use to reach this node.
    #[must_use]
    pub fn with_advertise(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Override the NATS URL for this node.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_placement_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.placement_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// The NATS URL to connect to.
    #[must_use]
    pub fn nats_url(&self) -> String {
        twin_net::connection::resolve_url(self.nats_url.as_deref())
    }

    /// How this node presents itself to discovery.
    #[must_use]
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            host: self.host.clone(),
            port: self.port,
            metadata: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RuntimeConfig::new("node-a");
        assert_eq!(cfg.name, "node-a");
        assert_eq!(cfg.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        assert!(cfg.placement_nodes.is_empty());
        assert!(cfg.nats_url.is_none());
    }

    #[test]
    fn test_builder() {
        let cfg = RuntimeConfig::new("node-a")
            .with_app_id("twins")
            .with_advertise("10.0.0.1", 4300)
            .with_nats_url("nats://broker:4222")
            .with_call_timeout(Duration::from_millis(500))
            .with_placement_nodes(["node-a", "node-b"]);
        assert_eq!(cfg.nats_url(), "nats://broker:4222");
        assert_eq!(cfg.call_timeout, Duration::from_millis(500));
        assert_eq!(cfg.placement_nodes, ["node-a", "node-b"]);

        let info = cfg.service_info();
        assert_eq!(info.app_id, "twins");
        assert_eq!(info.address(), "nats://10.0.0.1:4300");
    }
}
