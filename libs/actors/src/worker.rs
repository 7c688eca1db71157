//! Supervised workers
//!
//! A worker is an independently scheduled task with its own mailbox. The
//! pool drives it through [`Worker::on_start`], one [`Worker::handle`] call
//! per message, then [`Worker::on_stop`]. Returning an error from any hook
//! ends the task; the pool decides whether to restart it.

use crate::actor::{ActorHandle, ActorId, Mailbox};
use crate::allocator::random_address;
use crate::registry::RegistryClient;
use crate::supervision::{ExitReason, RestartPolicy};
use crate::{NodeError, Result};
use async_trait::async_trait;
use mesh_network::{GlobalRouter, TransportError};
use mesh_types::{Address, Message};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Behaviour of a supervised worker
#[async_trait]
pub trait Worker: Send + 'static {
    /// Called before the first message. Addresses are usually registered here.
    async fn on_start(&mut self, _ctx: &mut WorkerContext) -> Result<()> {
        Ok(())
    }

    /// Handle one message from the mailbox
    async fn handle(&mut self, ctx: &mut WorkerContext, message: Message) -> Result<()>;

    /// Called when the worker leaves its message loop without panicking
    async fn on_stop(&mut self, _ctx: &mut WorkerContext) -> Result<()> {
        Ok(())
    }
}

/// A kind of worker the pool can start on demand
pub trait WorkerKind: Send + Sync + 'static {
    type Options: Clone + Send + Sync + 'static;

    /// Name used in logs and start errors
    fn name(&self) -> &str;

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::Permanent
    }

    /// Build a fresh worker; called again for every restart
    fn create(&self, options: &Self::Options) -> Result<Box<dyn Worker>>;
}

type WorkerFactory = Arc<dyn Fn() -> Result<Box<dyn Worker>> + Send + Sync>;

/// Everything the pool needs to start, and restart, one child
#[derive(Clone)]
pub struct ChildSpec {
    kind: String,
    restart: RestartPolicy,
    factory: WorkerFactory,
}

impl ChildSpec {
    pub fn new<K: WorkerKind>(kind: K, options: K::Options) -> Self {
        let name = kind.name().to_string();
        let restart = kind.restart_policy();
        Self {
            kind: name,
            restart,
            factory: Arc::new(move || kind.create(&options)),
        }
    }

    /// Spec from a plain constructor closure
    pub fn from_fn<F>(kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            restart: RestartPolicy::default(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart
    }

    pub(crate) fn create(&self) -> Result<Box<dyn Worker>> {
        (self.factory)()
    }
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec")
            .field("kind", &self.kind)
            .field("restart", &self.restart)
            .finish()
    }
}

/// Addresses a worker registered, shared with the pool for cleanup
pub(crate) type Registrations = Arc<Mutex<Vec<Address>>>;

/// A worker's view of the node
pub struct WorkerContext {
    handle: ActorHandle,
    kind: String,
    registry: RegistryClient,
    router: Weak<dyn GlobalRouter>,
    registered: Registrations,
    max_attempts: u32,
    stop_requested: bool,
}

impl WorkerContext {
    pub(crate) fn new(
        handle: ActorHandle,
        kind: String,
        registry: RegistryClient,
        router: Weak<dyn GlobalRouter>,
        registered: Registrations,
        max_attempts: u32,
    ) -> Self {
        Self {
            handle,
            kind,
            registry,
            router,
            registered,
            max_attempts,
            stop_requested: false,
        }
    }

    /// This worker's own handle
    pub fn handle(&self) -> &ActorHandle {
        &self.handle
    }

    pub fn id(&self) -> ActorId {
        self.handle.id()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Bind `address` to this worker. Released automatically when it exits.
    pub async fn register(&mut self, address: Address) -> Result<()> {
        self.registry
            .register(address.clone(), self.handle.clone())
            .await?;
        self.registered.lock().push(address);
        Ok(())
    }

    /// Bind a fresh random address of `length` bytes to this worker
    pub async fn register_random(&mut self, length: usize) -> Result<Address> {
        if length == 0 {
            return Err(NodeError::InvalidAddressLength(length));
        }

        for _ in 0..self.max_attempts {
            let address = random_address(length);
            match self.register(address.clone()).await {
                Ok(()) => return Ok(address),
                Err(NodeError::AlreadyRegistered(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(NodeError::AllocationExhausted {
            length,
            attempts: self.max_attempts,
        })
    }

    pub async fn unregister(&mut self, address: &Address) -> Result<()> {
        self.registered.lock().retain(|a| a != address);
        self.registry.unregister(address.clone()).await
    }

    /// Addresses currently bound to this worker
    pub fn addresses(&self) -> Vec<Address> {
        self.registered.lock().clone()
    }

    /// Deliver through the registry, bypassing dispatch
    pub async fn send(&self, address: Address, message: Message) -> Result<()> {
        self.registry.send(address, message).await
    }

    /// Submit a message to the global router
    pub async fn route(&self, message: Message) -> Result<()> {
        let router = self
            .router
            .upgrade()
            .ok_or_else(|| TransportError::closed("global router dropped"))?;
        router.route(message).await?;
        Ok(())
    }

    /// Leave the message loop after the current message
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.handle.id())
            .field("kind", &self.kind)
            .field("stop_requested", &self.stop_requested)
            .finish()
    }
}

/// Drive one worker to completion.
///
/// `started` is answered once `on_start` has finished, successfully or not.
pub(crate) async fn run_worker(
    mut worker: Box<dyn Worker>,
    mut ctx: WorkerContext,
    mut mailbox: Mailbox,
    started: oneshot::Sender<Result<()>>,
) -> ExitReason {
    let task_start = Instant::now();
    let actor_id = ctx.id();

    if let Err(e) = worker.on_start(&mut ctx).await {
        error!(
            actor_id = %actor_id,
            kind = %ctx.kind,
            error = %e,
            "Worker failed to start"
        );
        let reason = ExitReason::Failed(e.to_string());
        let _ = started.send(Err(e));
        return reason;
    }
    let _ = started.send(Ok(()));

    debug!(
        actor_id = %actor_id,
        kind = %ctx.kind,
        startup_duration_ms = task_start.elapsed().as_millis(),
        "Worker started, entering message loop"
    );

    let mut reason = ExitReason::Normal;
    while !ctx.stop_requested {
        // The context holds a sender, so the mailbox never closes here
        let Some(message) = mailbox.recv().await else {
            break;
        };

        if let Err(e) = worker.handle(&mut ctx, message).await {
            error!(
                actor_id = %actor_id,
                kind = %ctx.kind,
                error = %e,
                error_category = e.category(),
                "Worker message processing failed"
            );
            reason = ExitReason::Failed(e.to_string());
            break;
        }
    }

    if let Err(e) = worker.on_stop(&mut ctx).await {
        error!(actor_id = %actor_id, error = %e, "Worker failed to stop cleanly");
        if reason.is_normal() {
            reason = ExitReason::Failed(e.to_string());
        }
    }

    info!(
        actor_id = %actor_id,
        kind = %ctx.kind,
        reason = %reason,
        total_runtime_ms = task_start.elapsed().as_millis(),
        "Worker exited"
    );
    reason
}
