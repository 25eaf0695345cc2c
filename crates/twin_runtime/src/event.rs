//! Routed events.
//!
//! An [`Event`] is a set of string attributes plus an opaque body. The owning
//! entity is named by the `entityid` extension attribute; everything else is
//! carried through unchanged. On the owning node the event is turned into a
//! [`MessageContext`] whose body has been parsed as JSON.

use std::collections::BTreeMap;

use twin_net::messages::RouteRequest;
use twin_value::Node;
use uuid::Uuid;

use crate::error::RouteError;

/// Extension attribute naming the target entity.
pub const ENTITY_ID: &str = "entityid";

/// Attribute carrying the event id.
pub const EVENT_ID: &str = "id";

/// Attribute describing what the event means.
pub const EVENT_TYPE: &str = "type";

/// Attribute naming the producer of the event.
pub const EVENT_SOURCE: &str = "source";

/// `type` of events that carry property updates for their entity.
pub const PROPERTY_UPDATE: &str = "twin.property.update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    attributes: BTreeMap<String, String>,
    data: Vec<u8>,
}

impl Event {
    /// Create an event for `entity_id` with a fresh id.
    pub fn new(entity_id: impl Into<String>, data: Vec<u8>) -> Self {
        let attributes = BTreeMap::from([
            (EVENT_ID.to_string(), Uuid::new_v4().to_string()),
            (ENTITY_ID.to_string(), entity_id.into()),
        ]);
        Self { attributes, data }
    }

    /// Rebuild an event from its wire parts. A missing id is generated.
    pub fn from_parts(mut attributes: BTreeMap<String, String>, data: Vec<u8>) -> Self {
        attributes
            .entry(EVENT_ID.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string());
        Self { attributes, data }
    }

    pub fn from_request(request: RouteRequest) -> Self {
        Self::from_parts(request.header, request.data)
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        self.attribute(EVENT_ID).unwrap_or_default()
    }

    /// The target entity, if the extension is present and non-empty.
    pub fn entity_id(&self) -> Option<&str> {
        self.attribute(ENTITY_ID).filter(|id| !id.is_empty())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The wire form forwarded to a peer.
    pub fn to_request(&self) -> RouteRequest {
        RouteRequest {
            header: self.attributes.clone(),
            data: self.data.clone(),
        }
    }
}

/// An event as handed to the local state manager.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    pub entity_id: String,
    /// All event attributes, including `entityid`.
    pub headers: BTreeMap<String, String>,
    /// The event body parsed as JSON. An empty body is an empty map.
    pub properties: Node,
}

impl MessageContext {
    /// # Errors
    ///
    /// Returns [`RouteError::MissingEntityId`] when the event has no target
    /// and [`RouteError::ParseEvent`] when the body is not JSON.
    pub fn from_event(event: &Event) -> Result<Self, RouteError> {
        let entity_id = event.entity_id().ok_or(RouteError::MissingEntityId)?;
        let properties = if event.data().is_empty() {
            Node::map()
        } else {
            Node::from_json_slice(event.data())
                .map_err(|e| RouteError::ParseEvent(e.to_string()))?
        };
        Ok(Self {
            entity_id: entity_id.to_string(),
            headers: event.attributes().clone(),
            properties,
        })
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_has_id_and_entity() {
        let ev = Event::new("device123", br#"{"temp":20}"#.to_vec());
        assert_eq!(ev.entity_id(), Some("device123"));
        assert!(!ev.id().is_empty());
        assert_ne!(ev.id(), Event::new("device123", Vec::new()).id());
    }

    #[test]
    fn test_request_roundtrip_keeps_attributes() {
        let ev = Event::new("device123", b"{}".to_vec()).with_attribute("type", "custom");
        let back = Event::from_request(ev.to_request());
        assert_eq!(back, ev);
    }

    #[test]
    fn test_from_parts_generates_missing_id() {
        let ev = Event::from_parts(BTreeMap::new(), Vec::new());
        assert!(!ev.id().is_empty());
        assert_eq!(ev.entity_id(), None);
    }

    #[test]
    fn test_message_context() {
        let ev = Event::new("device123", br#"{"temp":20,"meta":{"unit":"C"}}"#.to_vec());
        let ctx = MessageContext::from_event(&ev).unwrap();
        assert_eq!(ctx.entity_id, "device123");
        assert_eq!(ctx.properties.get("meta.unit"), Some(&Node::from("C")));
        assert_eq!(ctx.header(ENTITY_ID), Some("device123"));
    }

    #[test]
    fn test_message_context_errors() {
        let ev = Event::from_parts(BTreeMap::new(), b"{}".to_vec());
        assert!(matches!(
            MessageContext::from_event(&ev),
            Err(RouteError::MissingEntityId)
        ));
        let ev = Event::new("e1", b"not json".to_vec());
        assert!(matches!(
            MessageContext::from_event(&ev),
            Err(RouteError::ParseEvent(_))
        ));
    }

    #[test]
    fn test_empty_body_is_empty_map() {
        let ctx = MessageContext::from_event(&Event::new("e1", Vec::new())).unwrap();
        assert_eq!(ctx.properties, Node::map());
    }
}
