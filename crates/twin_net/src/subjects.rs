//! NATS subject hierarchy.
//!
//! All cluster subjects are prefixed with `twin.` to namespace within a
//! shared NATS deployment.

/// Root prefix for all cluster NATS subjects.
pub const PREFIX: &str = "twin";

// ── Discovery ───────────────────────────────────────────────────────────────

/// Membership events (join, update, leave). Any node → all nodes.
pub const DISCOVERY_EVENTS: &str = "twin.discovery.events";

/// Membership snapshot request/reply. Joining node → any live node.
pub const DISCOVERY_SNAPSHOT: &str = "twin.discovery.snapshot";

// ── Mapper registry ─────────────────────────────────────────────────────────

/// Mapper declaration change feed. Registry → all nodes.
pub const REGISTRY_MAPPERS: &str = "twin.registry.mappers";

// ── Dynamic subject builders ────────────────────────────────────────────────

/// Build the subject on which a node serves routed events.
///
/// `twin.proxy.route.<node_name>`
#[must_use]
pub fn proxy_route(node_name: &str) -> String {
    format!("{PREFIX}.proxy.route.{node_name}")
}

/// Build the queue group name for the instances serving one node name.
///
/// `q.<node_name>`
#[must_use]
pub fn queue_group(node_name: &str) -> String {
    format!("q.{node_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_route_subject() {
        assert_eq!(proxy_route("node-a"), "twin.proxy.route.node-a");
    }

    #[test]
    fn test_queue_group_name() {
        assert_eq!(queue_group("node-a"), "q.node-a");
    }

    #[test]
    fn test_static_subjects_share_prefix() {
        for subject in [DISCOVERY_EVENTS, DISCOVERY_SNAPSHOT, REGISTRY_MAPPERS] {
            assert!(subject.starts_with(PREFIX));
        }
    }
}
