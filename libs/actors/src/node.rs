//! Node facade
//!
//! [`Node::start`] binds the dispatch logic to the global router, then brings
//! the registry and worker pool online under the group supervisor. All
//! caller-facing operations go through the node and reach whichever
//! registry and pool generation is current.

use crate::actor::{ActorHandle, ActorId};
use crate::allocator::AddressAllocator;
use crate::control::ControlHandler;
use crate::metrics::{MetricsSnapshot, NodeMetrics};
use crate::pool::{ChildInfo, PoolClient};
use crate::registry::RegistryClient;
use crate::router::MessageRouter;
use crate::supervisor::{GroupSupervisor, Publication};
use crate::worker::{ChildSpec, WorkerKind};
use crate::{NodeError, Result};
use mesh_config::NodeConfig;
use mesh_network::{GlobalRouter, HandlerKey};
use mesh_types::{Address, Message};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handler keys the dispatch logic is bound to
pub const HANDLER_KEYS: [HandlerKey; 2] = [HandlerKey::Default, HandlerKey::Numeric(0)];

/// A running node control plane
pub struct Node {
    config: NodeConfig,
    router: Arc<dyn GlobalRouter>,
    dispatch: Arc<MessageRouter>,
    registry: RegistryClient,
    pool: PoolClient,
    allocator: AddressAllocator,
    generation: watch::Receiver<u64>,
    metrics: Arc<NodeMetrics>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    supervisor: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Node {
    /// Start the node.
    ///
    /// Returns once the dispatch logic is bound under [`HANDLER_KEYS`] and
    /// the first registry and pool generation is running.
    pub async fn start(config: NodeConfig, router: Arc<dyn GlobalRouter>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| NodeError::Configuration(format!("{:#}", e)))?;

        let metrics = Arc::new(NodeMetrics::default());
        let (registry_tx, registry_rx) = watch::channel(None);
        let (pool_tx, pool_rx) = watch::channel(None);
        let (generation_tx, generation_rx) = watch::channel(0u64);
        let registry = RegistryClient::new(registry_rx);

        let control = ControlHandler::new(Arc::downgrade(&router), metrics.clone());
        let dispatch = Arc::new(MessageRouter::new(
            registry.clone(),
            control,
            metrics.clone(),
        ));

        // Bound before any member starts, so no message can miss the handler
        for (bound, key) in HANDLER_KEYS.into_iter().enumerate() {
            if let Err(e) = router.set_message_handler(key, dispatch.clone()).await {
                warn!(key = %key, error = %e, "Failed to bind dispatch handler");
                for earlier in &HANDLER_KEYS[..bound] {
                    if let Err(e) = router.remove_message_handler(*earlier).await {
                        warn!(key = %earlier, error = %e, "Failed to unbind dispatch handler");
                    }
                }
                return Err(e.into());
            }
            debug!(key = %key, "Dispatch handler bound");
        }

        let supervisor = GroupSupervisor::new(
            config.clone(),
            Arc::downgrade(&router),
            metrics.clone(),
            Publication {
                registry: registry_tx,
                pool: pool_tx,
                generation: generation_tx,
            },
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervisor.run(shutdown_rx));

        let node = Self {
            allocator: AddressAllocator::from_settings(registry.clone(), &config.allocator),
            config,
            router,
            dispatch,
            registry,
            pool: PoolClient::new(pool_rx),
            generation: generation_rx,
            metrics,
            shutdown: Mutex::new(Some(shutdown_tx)),
            supervisor: Mutex::new(Some(supervisor)),
        };
        node.wait_for_generation(1).await?;

        info!(node = %node.config.node.name, "Node started");
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.config.node.name
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The global router this node is bound to
    pub fn router(&self) -> &Arc<dyn GlobalRouter> {
        &self.router
    }

    /// Client following the current registry generation
    pub fn registry(&self) -> RegistryClient {
        self.registry.clone()
    }

    pub async fn whereis(&self, address: &Address) -> Result<Option<ActorHandle>> {
        self.registry.lookup(address.clone()).await
    }

    pub async fn register_address(&self, address: Address, handle: ActorHandle) -> Result<()> {
        self.registry.register(address, handle).await
    }

    pub async fn unregister_address(&self, address: &Address) -> Result<()> {
        self.registry.unregister(address.clone()).await
    }

    pub async fn send(&self, address: Address, message: Message) -> Result<()> {
        self.registry.send(address, message).await
    }

    /// Run the dispatch decision for one message, as the global router would
    pub async fn dispatch(&self, message: Message) -> Result<()> {
        self.dispatch.dispatch(message).await
    }

    /// Random unregistered address of the configured length
    pub async fn get_random_unregistered_address(&self) -> Result<Address> {
        self.get_random_unregistered_address_with_length(self.config.allocator.address_length)
            .await
    }

    pub async fn get_random_unregistered_address_with_length(&self, length: usize) -> Result<Address> {
        self.allocator.generate_unregistered_address(length).await
    }

    /// Start a worker of `kind` under the dynamic pool
    pub async fn start_supervised<K: WorkerKind>(
        &self,
        kind: K,
        options: K::Options,
    ) -> Result<ActorHandle> {
        self.start_child(ChildSpec::new(kind, options)).await
    }

    pub async fn start_child(&self, spec: ChildSpec) -> Result<ActorHandle> {
        self.pool.current()?.start_child(spec).await
    }

    pub async fn terminate_child(&self, id: ActorId) -> Result<()> {
        self.pool.current()?.terminate_child(id).await
    }

    pub async fn which_children(&self) -> Result<Vec<ChildInfo>> {
        self.pool.current()?.which_children().await
    }

    /// Current group generation, starting at 1
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Group restarts since start
    pub fn restart_count(&self) -> u64 {
        self.generation().saturating_sub(1)
    }

    /// Wait until generation `generation` (or a later one) has been published
    pub async fn wait_for_generation(&self, generation: u64) -> Result<()> {
        let mut receiver = self.generation.clone();
        let reached = receiver.wait_for(|current| *current >= generation).await;
        reached.map(|_| ()).map_err(|_| NodeError::RegistryUnavailable)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// True while the group supervisor is running
    pub fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the pool, then the registry, and wait for the supervisor.
    ///
    /// Reports why the supervisor ended if it gave up on its own.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
        let supervisor = self.supervisor.lock().take();
        let Some(supervisor) = supervisor else {
            return Ok(());
        };

        let result = match supervisor.await {
            Ok(result) => result,
            Err(e) => Err(NodeError::worker(format!("group supervisor crashed: {}", e))),
        };
        info!(node = %self.config.node.name, "Node stopped");
        result
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.config.node.name)
            .field("generation", &self.generation())
            .finish()
    }
}
