//! Handler-key dispatch contract
//!
//! A [`GlobalRouter`] owns first dispatch: it maps a [`HandlerKey`] to the
//! [`MessageHandler`] a component registered for it. Nodes register once at
//! startup and afterwards only call [`GlobalRouter::route`] to push messages
//! (replies, forwards) back into the pipeline.

use crate::{HandlerError, Result};
use async_trait::async_trait;
use mesh_types::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod local;

pub use local::LocalRouter;

/// Key a handler is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandlerKey {
    /// Catch-all, used when no more specific key matches
    Default,
    /// Well-known numeric code
    Numeric(u8),
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKey::Default => write!(f, "default key"),
            HandlerKey::Numeric(code) => write!(f, "key {}", code),
        }
    }
}

/// Receiver side of a handler registration.
///
/// Failures are returned as-is; the router wraps them with the key the
/// message was delivered under.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError>;
}

/// The external router a node plugs its dispatch logic into
#[async_trait]
pub trait GlobalRouter: Send + Sync + 'static {
    /// Bind `handler` to `key`, replacing any previous binding
    async fn set_message_handler(
        &self,
        key: HandlerKey,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()>;

    /// Drop the binding for `key`; unbound keys are not an error
    async fn remove_message_handler(&self, key: HandlerKey) -> Result<()>;

    /// Submit a message for delivery.
    ///
    /// Returns once the message is accepted. Failures of the handler that
    /// eventually receives it are reported by the router, not the caller.
    async fn route(&self, message: Message) -> Result<()>;
}
