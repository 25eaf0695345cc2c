//! The seam to the local state layer.

use async_trait::async_trait;

use crate::event::MessageContext;

/// Applies events for entities owned by this node.
///
/// Errors are returned to whoever routed the event; the proxy does not
/// retry.
#[async_trait]
pub trait StateManager: Send + Sync {
    async fn handle_message(&self, ctx: MessageContext) -> anyhow::Result<()>;
}
