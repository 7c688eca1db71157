//! Control Protocol Handler
//!
//! Messages whose onward route is empty are addressed to the node itself.
//! The only instruction the node answers is PING; the PONG goes back out
//! through the global router along the ping's return route.

use crate::metrics::NodeMetrics;
use crate::{NodeError, Result};
use mesh_network::{GlobalRouter, TransportError};
use mesh_types::{ControlInstruction, Message};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub struct ControlHandler {
    router: Weak<dyn GlobalRouter>,
    metrics: Arc<NodeMetrics>,
}

impl ControlHandler {
    /// The router is held weakly: it owns the dispatch handler that owns us.
    pub fn new(router: Weak<dyn GlobalRouter>, metrics: Arc<NodeMetrics>) -> Self {
        Self { router, metrics }
    }

    /// Interpret a node-directed message
    pub async fn handle(&self, message: Message) -> Result<()> {
        self.metrics.record_control_message();

        match ControlInstruction::from_payload(message.payload()) {
            Some(ControlInstruction::Ping) => {
                let router = self
                    .router
                    .upgrade()
                    .ok_or_else(|| TransportError::closed("global router dropped"))?;

                let pong = message.pong();
                debug!(return_route = %message.return_route(), "Answering ping");
                router.route(pong).await?;
                self.metrics.record_pong();
                Ok(())
            }
            _ => {
                warn!(
                    payload = %hex::encode(message.payload()),
                    "Dropping unexpected control instruction"
                );
                Err(NodeError::UnexpectedControlInstruction {
                    payload: message.payload().clone(),
                    message,
                })
            }
        }
    }
}

impl std::fmt::Debug for ControlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandler")
            .field("router_alive", &(self.router.strong_count() > 0))
            .finish()
    }
}
