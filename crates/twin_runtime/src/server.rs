//! The route endpoint.
//!
//! A node serves forwarded events on `twin.proxy.route.<name>`. Each request
//! is handled on its own task: the event is rebuilt from the request, routed
//! through the local [`Proxy`], and the outcome is sent back as a
//! [`RouteResponse`].

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use twin_net::messages::{RouteRequest, RouteResponse};
use twin_net::{NatsConnection, NetError, subjects};

use crate::event::Event;
use crate::proxy::Proxy;

pub struct RouteServer {
    conn: NatsConnection,
    proxy: Arc<Proxy>,
}

impl RouteServer {
    #[must_use]
    pub fn new(conn: NatsConnection, proxy: Arc<Proxy>) -> Self {
        Self { conn, proxy }
    }

    /// Serve until the subscription closes.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn run(self) -> Result<(), NetError> {
        let name = self.proxy.local().name.clone();
        let subject = subjects::proxy_route(&name);
        let mut sub = self
            .conn
            .queue_subscribe(&subject, &subjects::queue_group(&name))
            .await?;
        info!(subject = %subject, "route server ready");

        while let Some(msg) = sub.next().await {
            let proxy = Arc::clone(&self.proxy);
            let conn = self.conn.clone();
            tokio::spawn(async move {
                let response = match twin_net::decode::<RouteRequest>(&msg.payload) {
                    Ok(request) => handle_request(&proxy, request).await,
                    Err(e) => {
                        warn!(%e, "malformed route request");
                        RouteResponse::error(format!("malformed route request: {e}"))
                    }
                };
                if let Some(reply) = msg.reply
                    && let Err(e) = conn.publish(reply.as_str(), &response).await
                {
                    error!(%e, "failed to publish route reply");
                }
            });
        }

        info!(subject = %subject, "route server stopped");
        Ok(())
    }
}

/// Route one forwarded request and describe the outcome.
pub async fn handle_request(proxy: &Proxy, request: RouteRequest) -> RouteResponse {
    let event = Event::from_request(request);
    match proxy.route_message(&event).await {
        Ok(()) => {
            debug!(event_id = event.id(), "forwarded event handled");
            RouteResponse::ok()
        }
        Err(e) => {
            warn!(event_id = event.id(), error = %e, "forwarded event failed");
            RouteResponse::error(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use twin_net::messages::ServiceInfo;

    use super::*;
    use crate::client::{Connector, ProxyClient};
    use crate::config::RuntimeConfig;
    use crate::event::{ENTITY_ID, MessageContext};
    use crate::placement::HashPlacement;
    use crate::state::StateManager;

    struct NoDial;

    #[async_trait]
    impl Connector for NoDial {
        async fn connect(&self, service: &ServiceInfo) -> Result<Arc<dyn ProxyClient>, NetError> {
            Err(NetError::NoResponders(service.name.clone()))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl StateManager for Recorder {
        async fn handle_message(&self, ctx: MessageContext) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(ctx.entity_id);
            Ok(())
        }
    }

    fn local_proxy(state: Arc<Recorder>) -> Proxy {
        let config = RuntimeConfig::new("node-a");
        let placement = Arc::new(HashPlacement::new("node-a", Vec::<String>::new()));
        Proxy::new(&config, placement, Arc::new(NoDial), state)
    }

    #[tokio::test]
    async fn test_handle_request_delivers_locally() {
        let state = Arc::new(Recorder::default());
        let proxy = local_proxy(Arc::clone(&state));
        let request = RouteRequest {
            header: BTreeMap::from([(ENTITY_ID.to_string(), "device123".to_string())]),
            data: br#"{"temp":1}"#.to_vec(),
        };
        let response = handle_request(&proxy, request).await;
        assert!(response.is_ok());
        assert_eq!(*state.0.lock().unwrap(), ["device123"]);
    }

    #[tokio::test]
    async fn test_handle_request_reports_errors() {
        let proxy = local_proxy(Arc::new(Recorder::default()));
        let response = handle_request(&proxy, RouteRequest::default()).await;
        assert_eq!(
            response.error.as_deref(),
            Some("event has no entityid attribute")
        );
    }
}
