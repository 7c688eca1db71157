//! Shared fixtures for node integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mesh_config::NodeConfig;
use mesh_network::{GlobalRouter, HandlerKey, LocalRouter, MessageHandler, TransportError};
use mesh_node::{Node, NodeError};
use mesh_types::{Address, Message};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Global router double: records handler bindings and every routed message
#[derive(Default)]
pub struct RecordingRouter {
    handlers: Mutex<BTreeMap<HandlerKey, Arc<dyn MessageHandler>>>,
    routed: Mutex<Vec<Message>>,
    refused: Option<HandlerKey>,
}

impl RecordingRouter {
    /// Router that fails any attempt to bind `key`
    pub fn refusing(key: HandlerKey) -> Self {
        Self {
            refused: Some(key),
            ..Self::default()
        }
    }

    pub fn routed(&self) -> Vec<Message> {
        self.routed.lock().clone()
    }

    pub fn keys(&self) -> Vec<HandlerKey> {
        self.handlers.lock().keys().copied().collect()
    }

    pub fn handler(&self, key: HandlerKey) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.lock().get(&key).cloned()
    }
}

#[async_trait]
impl GlobalRouter for RecordingRouter {
    async fn set_message_handler(
        &self,
        key: HandlerKey,
        handler: Arc<dyn MessageHandler>,
    ) -> mesh_network::Result<()> {
        if self.refused == Some(key) {
            return Err(TransportError::configuration("key refused", Some("handler_key")));
        }
        self.handlers.lock().insert(key, handler);
        Ok(())
    }

    async fn remove_message_handler(&self, key: HandlerKey) -> mesh_network::Result<()> {
        self.handlers.lock().remove(&key);
        Ok(())
    }

    async fn route(&self, message: Message) -> mesh_network::Result<()> {
        self.routed.lock().push(message);
        Ok(())
    }
}

/// Quiet config with fast restart windows
pub fn test_config() -> NodeConfig {
    NodeConfig::from_toml_str(
        r#"
        [node]
        name = "test-node"

        [supervision]
        max_restarts = 3
        restart_window_secs = 5

        [pool]
        max_restarts = 2
        restart_window_secs = 60
        "#,
    )
    .unwrap()
}

pub async fn start_recording(config: NodeConfig) -> (Node, Arc<RecordingRouter>) {
    let router = Arc::new(RecordingRouter::default());
    let node = Node::start(config, router.clone()).await.unwrap();
    (node, router)
}

pub async fn start_local(config: NodeConfig) -> (Node, Arc<LocalRouter>) {
    let router = Arc::new(LocalRouter::new());
    let node = Node::start(config, router.clone()).await.unwrap();
    (node, router)
}

pub fn addr(byte: u8) -> Address {
    Address::from([byte, 0xbe, 0xef, byte])
}

/// Fail the test instead of hanging
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

/// Retry `op` until it stops reporting an unavailable registry or pool
pub async fn when_available<T, F, Fut>(mut op: F) -> mesh_node::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = mesh_node::Result<T>>,
{
    loop {
        match op().await {
            Err(NodeError::RegistryUnavailable) | Err(NodeError::PoolUnavailable) => {
                tokio::time::sleep(Duration::from_millis(5)).await
            }
            other => return other,
        }
    }
}
