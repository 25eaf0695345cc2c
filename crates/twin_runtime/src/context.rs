//! The runtime context.
//!
//! One [`RuntimeContext`] per node holds the configuration and the shared
//! services. Components receive the context explicitly. The proxy exists only
//! after [`RuntimeContext::start`]; asking for it earlier yields
//! [`RuntimeError::ServerNotReady`].

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::client::Connector;
use crate::config::RuntimeConfig;
use crate::discovery::Resolver;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::placement::{HashPlacement, Placement};
use crate::propagate::Propagator;
use crate::proxy::Proxy;
use crate::state::StateManager;

pub struct RuntimeContext {
    config: RuntimeConfig,
    environment: Arc<Environment>,
    placement: Arc<dyn Placement>,
    proxy: OnceLock<Arc<Proxy>>,
}

impl RuntimeContext {
    /// A context with an empty environment and hash placement over the
    /// configured nodes.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let placement = Arc::new(HashPlacement::new(
            config.name.clone(),
            config.placement_nodes.iter().cloned(),
        ));
        Self::with_placement(config, placement)
    }

    #[must_use]
    pub fn with_placement(config: RuntimeConfig, placement: Arc<dyn Placement>) -> Self {
        Self {
            config,
            environment: Arc::new(Environment::new()),
            placement,
            proxy: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn placement(&self) -> &Arc<dyn Placement> {
        &self.placement
    }

    #[must_use]
    pub fn propagator(&self) -> Propagator {
        Propagator::new(Arc::clone(&self.environment))
    }

    /// Build and start the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyStarted`] on a second call.
    pub async fn start(
        &self,
        connector: Arc<dyn Connector>,
        state_manager: Arc<dyn StateManager>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Arc<Proxy>, RuntimeError> {
        if self.proxy.get().is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        let proxy = Proxy::new(
            &self.config,
            Arc::clone(&self.placement),
            connector,
            state_manager,
        )
        .start(resolver)
        .await;
        self.proxy
            .set(Arc::clone(&proxy))
            .map_err(|_| RuntimeError::AlreadyStarted)?;
        info!(node = %self.config.name, "runtime started");
        Ok(proxy)
    }

    /// The started proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ServerNotReady`] before [`start`](Self::start)
    /// completes.
    pub fn proxy(&self) -> Result<Arc<Proxy>, RuntimeError> {
        self.proxy.get().cloned().ok_or(RuntimeError::ServerNotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.proxy.get().is_some()
    }
}
