//! Propagating property changes through mappers.
//!
//! When an entity's properties change, every mapper that watches one of the
//! changed properties is run over the entity's current data, and each
//! mapper's output is routed to the mapper's target entity as a
//! property-update event. The binding holds only the changed entity's data;
//! mappers over several sources compute whatever fields that data allows.

use std::sync::Arc;

use tracing::{debug, warn};
use twin_tql::{Binding, Mapper};
use twin_value::Node;

use crate::environment::Environment;
use crate::error::RouteError;
use crate::event::{EVENT_SOURCE, EVENT_TYPE, Event, PROPERTY_UPDATE};
use crate::proxy::Proxy;

/// Attribute naming the mapper that produced an update.
pub const MAPPER_ATTR: &str = "mapper";

pub struct Propagator {
    environment: Arc<Environment>,
}

impl Propagator {
    #[must_use]
    pub fn new(environment: Arc<Environment>) -> Self {
        Self { environment }
    }

    /// The property-update events caused by `changes` on `entity_id`.
    ///
    /// `changes` is a map of property paths (top-level or dotted) to new
    /// values and selects the mappers to run. `state` is the entity's data
    /// after the changes were applied and is what the mappers read. Mappers
    /// that fail to compute anything are skipped.
    pub fn derive(&self, entity_id: &str, changes: &Node, state: &Node) -> Vec<Event> {
        let Some(changed) = changes.as_map() else {
            return Vec::new();
        };
        if changed.is_empty() {
            return Vec::new();
        }

        let binding: Binding = state
            .as_map()
            .into_iter()
            .flatten()
            .map(|(path, value)| (format!("{entity_id}.{path}"), value.clone()))
            .collect();

        self.environment
            .mappers_for(entity_id)
            .into_iter()
            .filter(|mapper| watches_any(mapper, entity_id, changed.keys()))
            .filter_map(|mapper| update_event(&mapper, entity_id, &binding))
            .collect()
    }

    /// Derive and route the updates caused by `changes`. Every update is
    /// attempted; the first failure is returned after all were tried.
    ///
    /// # Errors
    ///
    /// Returns the first [`RouteError`] among the routed updates.
    pub async fn on_change(
        &self,
        proxy: &Proxy,
        entity_id: &str,
        changes: &Node,
        state: &Node,
    ) -> Result<usize, RouteError> {
        let events = self.derive(entity_id, changes, state);
        let mut first_error = None;
        let mut routed = 0;
        for event in &events {
            match proxy.route_message(event).await {
                Ok(()) => routed += 1,
                Err(e) => {
                    warn!(
                        entity_id,
                        to = event.entity_id().unwrap_or_default(),
                        error = %e,
                        "failed to route mapped update"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(routed),
        }
    }
}

fn watches_any<'a>(
    mapper: &Mapper,
    entity_id: &str,
    mut paths: impl Iterator<Item = &'a String>,
) -> bool {
    let tentacles: Vec<_> = mapper
        .tentacles()
        .iter()
        .filter(|t| t.source_id() == entity_id)
        .collect();
    paths.any(|path| tentacles.iter().any(|t| t.watches(path)))
}

fn update_event(mapper: &Mapper, source: &str, binding: &Binding) -> Option<Event> {
    let outputs = match mapper.exec(binding) {
        Ok(outputs) => outputs,
        Err(e) => {
            debug!(mapper = mapper.id(), error = %e, "mapper produced nothing");
            return None;
        }
    };

    let mut body = Node::map();
    for (path, value) in outputs {
        if let Err(e) = body.set(&path, value) {
            warn!(mapper = mapper.id(), %path, error = %e, "dropping mapped field");
        }
    }

    Some(
        Event::new(mapper.target_entity(), body.to_json_vec())
            .with_attribute(EVENT_TYPE, PROPERTY_UPDATE)
            .with_attribute(EVENT_SOURCE, source)
            .with_attribute(MAPPER_ATTR, mapper.id()),
    )
}
