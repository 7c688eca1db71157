//! Message Router
//!
//! First-hop dispatch for every message the global router hands to this
//! node. A non-empty onward route is forwarded whole to the registry
//! binding of its head; an empty one is a control message.
//!
//! The router never rewrites a route. Receivers that consume hops do so
//! themselves (see [`Message::advance`]).

use crate::control::ControlHandler;
use crate::metrics::NodeMetrics;
use crate::registry::RegistryClient;
use crate::{NodeError, Result};
use async_trait::async_trait;
use mesh_network::{HandlerError, MessageHandler};
use mesh_types::{Address, Message};
use std::sync::Arc;
use tracing::debug;

/// Outcome of classifying a message's onward route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'a> {
    /// Deliver the unmodified message to the actor bound to this address
    Forward(&'a Address),
    /// Route fully consumed; the node itself is the destination
    Control,
}

/// Pure classification of `message` by its onward route.
///
/// A zero-length head address cannot name a registered actor and is
/// rejected as a malformed route.
pub fn classify(message: &Message) -> Result<Dispatch<'_>> {
    match message.onward_route().head() {
        None => Ok(Dispatch::Control),
        Some(head) if head.is_empty() => Err(NodeError::UnexpectedOnwardRoute(
            message.onward_route().clone(),
        )),
        Some(head) => Ok(Dispatch::Forward(head)),
    }
}

pub struct MessageRouter {
    registry: RegistryClient,
    control: ControlHandler,
    metrics: Arc<NodeMetrics>,
}

impl MessageRouter {
    pub fn new(registry: RegistryClient, control: ControlHandler, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            registry,
            control,
            metrics,
        }
    }

    /// Dispatch one inbound message
    pub async fn dispatch(&self, message: Message) -> Result<()> {
        let result = match classify(&message) {
            Ok(Dispatch::Forward(head)) => {
                let head = head.clone();
                debug!(address = %head, onward_route = %message.onward_route(), "Forwarding message");
                self.registry
                    .send(head, message)
                    .await
                    .map(|()| self.metrics.record_forwarded())
            }
            Ok(Dispatch::Control) => self.control.handle(message).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.metrics.record_dispatch_failure();
            debug!(error = %e, category = e.category(), "Dispatch failed");
        }
        result
    }
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
        self.dispatch(message).await.map_err(HandlerError::from)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("control", &self.control)
            .finish()
    }
}
