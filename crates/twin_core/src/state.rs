//! The node's state manager.
//!
//! Keeps the last known properties of every entity owned by this node, merged
//! from the events delivered to it, and propagates each change through the
//! mappers registered in the runtime environment.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use twin_runtime::event::EVENT_TYPE;
use twin_runtime::{MessageContext, RuntimeContext, StateManager};
use twin_value::Node;

pub struct EntityState {
    context: Weak<RuntimeContext>,
    entities: Mutex<HashMap<String, Node>>,
}

impl EntityState {
    #[must_use]
    pub fn new(context: Weak<RuntimeContext>) -> Self {
        Self {
            context,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Last known properties of `entity_id`.
    pub fn properties(&self, entity_id: &str) -> Option<Node> {
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// Apply `changes` to the entity and return its merged properties. The
    /// entity is left untouched if any change fails to apply.
    fn merge(&self, entity_id: &str, changes: &Node) -> anyhow::Result<Node> {
        let Some(changes) = changes.as_map() else {
            anyhow::bail!("properties of {entity_id} are not an object");
        };
        let mut entities = self.entities.lock().unwrap_or_else(PoisonError::into_inner);
        let mut merged = entities.get(entity_id).cloned().unwrap_or_else(Node::map);
        for (path, value) in changes {
            merged.set(path, value.clone())?;
        }
        entities.insert(entity_id.to_string(), merged.clone());
        Ok(merged)
    }
}

#[async_trait]
impl StateManager for EntityState {
    async fn handle_message(&self, ctx: MessageContext) -> anyhow::Result<()> {
        let merged = self.merge(&ctx.entity_id, &ctx.properties)?;
        let changed = ctx.properties.as_map().map_or(0, |m| m.len());
        info!(
            entity_id = %ctx.entity_id,
            changed,
            event_type = ctx.header(EVENT_TYPE).unwrap_or_default(),
            "entity updated"
        );
        if changed == 0 {
            return Ok(());
        }

        let Some(context) = self.context.upgrade() else {
            return Ok(());
        };
        let proxy = context.proxy()?;
        match context
            .propagator()
            .on_change(&proxy, &ctx.entity_id, &ctx.properties, &merged)
            .await
        {
            Ok(routed) => debug!(entity_id = %ctx.entity_id, routed, "mapped updates routed"),
            // The change itself is applied; failed follow-ups are already logged.
            Err(e) => warn!(entity_id = %ctx.entity_id, error = %e, "propagation incomplete"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use twin_net::NetError;
    use twin_net::messages::{KvPair, ServiceInfo};
    use twin_runtime::{
        Connector, Event, MemoryResolver, ProxyClient, RouteError, RuntimeConfig,
    };

    use super::*;

    struct NoDial;

    #[async_trait]
    impl Connector for NoDial {
        async fn connect(&self, service: &ServiceInfo) -> Result<Arc<dyn ProxyClient>, NetError> {
            Err(NetError::NoResponders(service.name.clone()))
        }
    }

    async fn started() -> (Arc<RuntimeContext>, Arc<EntityState>) {
        let ctx = Arc::new(RuntimeContext::new(RuntimeConfig::new("node-a")));
        ctx.environment().store_mappers(&[
            KvPair::new(
                "core.mapper.BASIC.display.temp",
                "insert into display select sensor.temp * 2 as temp2",
            ),
            KvPair::new(
                "core.mapper.BASIC.display.sum",
                "insert into display select sensor.a + sensor.b as c",
            ),
        ]);
        let state = Arc::new(EntityState::new(Arc::downgrade(&ctx)));
        ctx.start(
            Arc::new(NoDial),
            Arc::clone(&state) as Arc<dyn StateManager>,
            Arc::new(MemoryResolver::new(Vec::<ServiceInfo>::new())),
        )
        .await
        .unwrap();
        (ctx, state)
    }

    fn update(entity: &str, json: serde_json::Value) -> Event {
        Event::new(entity, serde_json::to_vec(&json).unwrap())
    }

    #[tokio::test]
    async fn test_changes_are_merged() {
        let (ctx, state) = started().await;
        let proxy = ctx.proxy().unwrap();
        proxy
            .route_message(&update("lamp", serde_json::json!({"on": true})))
            .await
            .unwrap();
        proxy
            .route_message(&update("lamp", serde_json::json!({"level": 3})))
            .await
            .unwrap();

        let lamp = state.properties("lamp").unwrap();
        assert_eq!(lamp.get("on"), Some(&Node::Bool(true)));
        assert_eq!(lamp.get("level"), Some(&Node::Int(3)));
    }

    #[tokio::test]
    async fn test_change_propagates_to_mapped_entity() {
        let (ctx, state) = started().await;
        ctx.proxy()
            .unwrap()
            .route_message(&update("sensor", serde_json::json!({"temp": 20})))
            .await
            .unwrap();

        let display = state.properties("display").unwrap();
        assert_eq!(display.get("temp2"), Some(&Node::Int(40)));
    }

    #[tokio::test]
    async fn test_mapper_sees_properties_from_earlier_events() {
        let (ctx, state) = started().await;
        let proxy = ctx.proxy().unwrap();
        proxy
            .route_message(&update("sensor", serde_json::json!({"a": 1})))
            .await
            .unwrap();
        assert!(state.properties("display").is_none());

        proxy
            .route_message(&update("sensor", serde_json::json!({"b": 2})))
            .await
            .unwrap();
        let display = state.properties("display").unwrap();
        assert_eq!(display.get("c"), Some(&Node::Int(3)));
    }

    #[tokio::test]
    async fn test_conflicting_change_leaves_entity_untouched() {
        let (ctx, state) = started().await;
        let proxy = ctx.proxy().unwrap();
        proxy
            .route_message(&update("lamp", serde_json::json!({"level": 3})))
            .await
            .unwrap();

        // "a" sorts before "level.x", which cannot descend into an integer.
        let err = proxy
            .route_message(&update("lamp", serde_json::json!({"a": 1, "level.x": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Local(_)));

        let lamp = state.properties("lamp").unwrap();
        assert_eq!(lamp.get("a"), None);
        assert_eq!(lamp.get("level"), Some(&Node::Int(3)));
    }

    #[tokio::test]
    async fn test_non_object_body_is_rejected() {
        let (ctx, state) = started().await;
        let err = ctx
            .proxy()
            .unwrap()
            .route_message(&Event::new("lamp", b"[1,2]".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Local(_)));
        assert!(state.properties("lamp").is_none());
    }
}
