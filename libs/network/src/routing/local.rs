//! In-process global router

use super::{GlobalRouter, HandlerKey, MessageHandler};
use crate::{Result, TransportError};
use async_trait::async_trait;
use mesh_types::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

type Handlers = Arc<RwLock<HashMap<HandlerKey, Arc<dyn MessageHandler>>>>;

/// Global router for a node embedded in a single process.
///
/// [`route`](GlobalRouter::route) and [`route_with_key`](LocalRouter::route_with_key)
/// queue the message and return. A delivery task hands queued messages to
/// their handlers in submission order and logs handler failures. Keyed
/// delivery falls back to the catch-all when the key has no handler.
///
/// Must be created inside a Tokio runtime.
pub struct LocalRouter {
    handlers: Handlers,
    queue: mpsc::UnboundedSender<(HandlerKey, Message)>,
}

impl LocalRouter {
    pub fn new() -> Self {
        let handlers = Handlers::default();
        let (queue, pending) = mpsc::unbounded_channel();
        tokio::spawn(run_delivery(handlers.clone(), pending));
        Self { handlers, queue }
    }

    /// Queue `message` for the handler bound to `key`
    pub async fn route_with_key(&self, key: HandlerKey, message: Message) -> Result<()> {
        if resolve(&self.handlers, key).await.is_none() {
            warn!(%key, "Dropping message: no handler registered");
            return Err(TransportError::no_handler(key));
        }

        debug!(%key, onward_route = %message.onward_route(), "Queueing message");
        self.queue
            .send((key, message))
            .map_err(|_| TransportError::closed("delivery task stopped"))
    }

    /// Hand `message` to its handler now and return the handler's result
    pub async fn deliver_with_key(&self, key: HandlerKey, message: Message) -> Result<()> {
        deliver(&self.handlers, key, message).await
    }

    /// Keys that currently have a handler
    pub async fn handler_keys(&self) -> Vec<HandlerKey> {
        let mut keys: Vec<_> = self.handlers.read().await.keys().copied().collect();
        keys.sort();
        keys
    }
}

impl Default for LocalRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRouter")
            .field("delivery_running", &!self.queue.is_closed())
            .finish_non_exhaustive()
    }
}

async fn resolve(handlers: &Handlers, key: HandlerKey) -> Option<Arc<dyn MessageHandler>> {
    // Lock is released before handling: handlers route replies through us
    let handlers = handlers.read().await;
    let handler = handlers
        .get(&key)
        .or_else(|| handlers.get(&HandlerKey::Default))
        .cloned();
    handler
}

async fn deliver(handlers: &Handlers, key: HandlerKey, message: Message) -> Result<()> {
    let handler = resolve(handlers, key)
        .await
        .ok_or_else(|| TransportError::no_handler(key))?;

    debug!(%key, onward_route = %message.onward_route(), "Delivering message");
    handler
        .handle(message)
        .await
        .map_err(|source| TransportError::handler(key, source))
}

async fn run_delivery(
    handlers: Handlers,
    mut pending: mpsc::UnboundedReceiver<(HandlerKey, Message)>,
) {
    while let Some((key, message)) = pending.recv().await {
        if let Err(e) = deliver(&handlers, key, message).await {
            warn!(%key, error = %e, "Message delivery failed");
        }
    }
    debug!("Local router delivery stopped");
}

#[async_trait]
impl GlobalRouter for LocalRouter {
    async fn set_message_handler(
        &self,
        key: HandlerKey,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        if self.handlers.write().await.insert(key, handler).is_some() {
            warn!(%key, "Replaced existing message handler");
        } else {
            debug!(%key, "Registered message handler");
        }
        Ok(())
    }

    async fn remove_message_handler(&self, key: HandlerKey) -> Result<()> {
        if self.handlers.write().await.remove(&key).is_some() {
            debug!(%key, "Removed message handler");
        }
        Ok(())
    }

    async fn route(&self, message: Message) -> Result<()> {
        self.route_with_key(HandlerKey::Default, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerError;
    use mesh_types::{Address, Route};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    impl Recorder {
        async fn wait_for(&self, count: usize) -> Vec<Message> {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let seen = self.seen.lock().clone();
                    if seen.len() >= count {
                        return seen;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("messages not delivered")
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
            self.seen.lock().push(message);
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl MessageHandler for Rejecting {
        async fn handle(&self, _message: Message) -> std::result::Result<(), HandlerError> {
            Err("rejected".into())
        }
    }

    fn message(byte: u8) -> Message {
        Message::new(vec![Address::from([byte])], Route::empty(), vec![byte])
    }

    #[tokio::test]
    async fn test_route_without_handlers_fails() {
        let router = LocalRouter::new();
        let err = router.route(message(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::NoHandler { key: HandlerKey::Default }));
    }

    #[tokio::test]
    async fn test_keyed_delivery_prefers_exact_key() {
        let router = LocalRouter::new();
        let catch_all = Arc::new(Recorder::default());
        let numeric = Arc::new(Recorder::default());

        router.set_message_handler(HandlerKey::Default, catch_all.clone()).await.unwrap();
        router.set_message_handler(HandlerKey::Numeric(0), numeric.clone()).await.unwrap();

        router.deliver_with_key(HandlerKey::Numeric(0), message(1)).await.unwrap();
        router.deliver_with_key(HandlerKey::Numeric(7), message(2)).await.unwrap();

        assert_eq!(*numeric.seen.lock(), vec![message(1)]);
        assert_eq!(*catch_all.seen.lock(), vec![message(2)]);
        assert_eq!(
            router.handler_keys().await,
            vec![HandlerKey::Default, HandlerKey::Numeric(0)]
        );
    }

    #[tokio::test]
    async fn test_routed_messages_arrive_in_submission_order() {
        let router = LocalRouter::new();
        let recorder = Arc::new(Recorder::default());
        router.set_message_handler(HandlerKey::Default, recorder.clone()).await.unwrap();

        for byte in 1..=5 {
            router.route(message(byte)).await.unwrap();
        }

        let seen = recorder.wait_for(5).await;
        assert_eq!(seen, (1..=5).map(message).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_route_accepts_message_its_handler_rejects() {
        let router = LocalRouter::new();
        router.set_message_handler(HandlerKey::Default, Arc::new(Rejecting)).await.unwrap();

        router.route(message(1)).await.unwrap();
        router
            .route_with_key(HandlerKey::Numeric(3), message(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handler_failure_carries_key() {
        let router = LocalRouter::new();
        router
            .set_message_handler(HandlerKey::Numeric(0), Arc::new(Rejecting))
            .await
            .unwrap();

        let err = router
            .deliver_with_key(HandlerKey::Numeric(0), message(1))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Handler { key: HandlerKey::Numeric(0), .. }));
        assert_eq!(err.to_string(), "Handler for key 0 failed: rejected");
    }

    #[tokio::test]
    async fn test_remove_handler() {
        let router = LocalRouter::new();
        router
            .set_message_handler(HandlerKey::Numeric(0), Arc::new(Recorder::default()))
            .await
            .unwrap();

        router.remove_message_handler(HandlerKey::Numeric(0)).await.unwrap();
        router.remove_message_handler(HandlerKey::Numeric(0)).await.unwrap();
        assert!(router.handler_keys().await.is_empty());
        assert!(matches!(
            router.route_with_key(HandlerKey::Numeric(0), message(1)).await,
            Err(TransportError::NoHandler { .. })
        ));
    }
}
