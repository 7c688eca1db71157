//! Dynamic worker pool
//!
//! One-for-one supervisor for workers started on demand. Each child runs in
//! its own task; when one exits, its registrations are released and only
//! that child is restarted, according to its
//! [`RestartPolicy`](crate::supervision::RestartPolicy). Too many
//! restarts within the configured window end the pool with an error, which
//! the group supervisor treats as a member crash.

use crate::actor::{ActorHandle, ActorId};
use crate::metrics::NodeMetrics;
use crate::registry::RegistryClient;
use crate::supervision::{ExitReason, GroupMember, RestartIntensity};
use crate::worker::{run_worker, ChildSpec, Registrations, WorkerContext};
use crate::{NodeError, Result};
use futures::FutureExt;
use mesh_config::PoolSettings;
use mesh_network::GlobalRouter;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub(crate) enum PoolCommand {
    StartChild {
        spec: ChildSpec,
        reply: oneshot::Sender<Result<ActorHandle>>,
    },
    TerminateChild {
        id: ActorId,
        reply: oneshot::Sender<Result<()>>,
    },
    WhichChildren {
        reply: oneshot::Sender<Vec<ChildInfo>>,
    },
    Stop,
}

/// Summary of one running child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
    pub id: ActorId,
    pub kind: String,
    /// Times this child has been restarted by the pool
    pub restarts: u32,
}

struct Child {
    spec: ChildSpec,
    registered: Registrations,
    task: AbortHandle,
    restarts: u32,
}

/// Shared by every child the pool starts
#[derive(Clone)]
pub(crate) struct PoolEnvironment {
    pub registry: RegistryClient,
    pub router: Weak<dyn GlobalRouter>,
    pub metrics: Arc<NodeMetrics>,
    pub max_attempts: u32,
}

struct WorkerPool {
    generation: u64,
    env: PoolEnvironment,
    children: HashMap<ActorId, Child>,
    tasks: JoinSet<(ActorId, ExitReason)>,
    intensity: RestartIntensity,
}

impl WorkerPool {
    async fn run(mut self, mut commands: mpsc::Receiver<PoolCommand>) -> Result<()> {
        info!(generation = self.generation, "Worker pool started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PoolCommand::Stop) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok((id, reason)) => self.child_exited(id, reason).await?,
                    // Cancelled by terminate_child; already cleaned up
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "Worker task failed to join"),
                },
            }
        }

        self.tasks.shutdown().await;
        for (id, child) in self.children.drain() {
            release_addresses(&self.env.registry, id, &child.registered);
        }
        info!(generation = self.generation, "Worker pool stopped");
        Ok(())
    }

    async fn handle_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::StartChild { spec, reply } => {
                let _ = reply.send(self.start_child(spec, 0).await);
            }
            PoolCommand::TerminateChild { id, reply } => {
                let _ = reply.send(self.terminate_child(id));
            }
            PoolCommand::WhichChildren { reply } => {
                let children = self
                    .children
                    .iter()
                    .map(|(id, child)| ChildInfo {
                        id: *id,
                        kind: child.spec.kind().to_string(),
                        restarts: child.restarts,
                    })
                    .collect();
                let _ = reply.send(children);
            }
            PoolCommand::Stop => {}
        }
    }

    /// Spawn `spec` and wait for its `on_start`
    async fn start_child(&mut self, spec: ChildSpec, restarts: u32) -> Result<ActorHandle> {
        let worker = spec
            .create()
            .map_err(|e| NodeError::start(spec.kind(), e))?;

        let (handle, mailbox) = ActorHandle::channel();
        let id = handle.id();
        let registered = Registrations::default();
        let ctx = WorkerContext::new(
            handle.clone(),
            spec.kind().to_string(),
            self.env.registry.clone(),
            self.env.router.clone(),
            registered.clone(),
            self.env.max_attempts,
        );

        let (started, started_rx) = oneshot::channel();
        let task = self.tasks.spawn(async move {
            let reason = match AssertUnwindSafe(run_worker(worker, ctx, mailbox, started))
                .catch_unwind()
                .await
            {
                Ok(reason) => reason,
                Err(panic) => ExitReason::Panicked(panic_message(panic.as_ref())),
            };
            (id, reason)
        });

        let start_result = match started_rx.await {
            Ok(result) => result,
            Err(_) => Err(NodeError::worker("panicked during start")),
        };
        if let Err(e) = start_result {
            release_addresses(&self.env.registry, id, &registered);
            return Err(NodeError::start(spec.kind(), e));
        }

        info!(
            actor_id = %id,
            kind = %spec.kind(),
            restarts,
            "Supervised worker started"
        );
        self.env.metrics.record_worker_started();
        self.children.insert(
            id,
            Child {
                spec,
                registered,
                task,
                restarts,
            },
        );
        Ok(handle)
    }

    /// Stop a child without restarting it. No `on_stop` is run.
    fn terminate_child(&mut self, id: ActorId) -> Result<()> {
        let child = self
            .children
            .remove(&id)
            .ok_or(NodeError::UnknownChild(id))?;

        child.task.abort();
        release_addresses(&self.env.registry, id, &child.registered);
        info!(actor_id = %id, kind = %child.spec.kind(), "Supervised worker terminated");
        Ok(())
    }

    async fn child_exited(&mut self, id: ActorId, reason: ExitReason) -> Result<()> {
        // Children that never finished starting were never tracked
        let Some(child) = self.children.remove(&id) else {
            return Ok(());
        };
        release_addresses(&self.env.registry, id, &child.registered);

        if !child.spec.restart_policy().should_restart(&reason) {
            info!(actor_id = %id, kind = %child.spec.kind(), reason = %reason, "Supervised worker exited");
            return Ok(());
        }
        warn!(actor_id = %id, kind = %child.spec.kind(), reason = %reason, "Supervised worker exited, restarting");

        let restarts = child.restarts.saturating_add(1);
        loop {
            if !self.intensity.allow_restart() {
                error!(
                    kind = %child.spec.kind(),
                    restart_count = self.intensity.count(),
                    max_restarts = self.intensity.max_restarts(),
                    "Worker pool exceeded restart limit, escalating"
                );
                return Err(NodeError::RestartIntensityExceeded {
                    member: GroupMember::WorkerPool.to_string(),
                });
            }

            self.env.metrics.record_worker_restart();
            match self.start_child(child.spec.clone(), restarts).await {
                Ok(handle) => {
                    debug!(old = %id, new = %handle.id(), "Worker restarted");
                    return Ok(());
                }
                Err(e) => warn!(kind = %child.spec.kind(), error = %e, "Worker restart failed"),
            }
        }
    }
}

fn release_addresses(registry: &RegistryClient, owner: ActorId, registered: &Registrations) {
    let addresses = std::mem::take(&mut *registered.lock());
    let Ok(current) = registry.current() else {
        return;
    };
    for address in addresses {
        // Registry gone means the binding is gone with it
        let _ = current.release(address, owner);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawn an empty pool on the current runtime
pub(crate) fn spawn_pool(
    generation: u64,
    env: PoolEnvironment,
    settings: &PoolSettings,
) -> (PoolHandle, JoinHandle<Result<()>>) {
    let (sender, receiver) = mpsc::channel(settings.command_buffer);
    let pool = WorkerPool {
        generation,
        env,
        children: HashMap::new(),
        tasks: JoinSet::new(),
        intensity: RestartIntensity::new(settings.max_restarts, settings.restart_window()),
    };
    let task = tokio::spawn(pool.run(receiver));
    (PoolHandle { sender, generation }, task)
}

/// Handle to one pool instance
#[derive(Clone, Debug)]
pub struct PoolHandle {
    sender: mpsc::Sender<PoolCommand>,
    generation: u64,
}

impl PoolHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PoolCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| NodeError::PoolUnavailable)?;
        response.await.map_err(|_| NodeError::PoolUnavailable)
    }

    /// Start and supervise a child; returns once its `on_start` succeeded
    pub async fn start_child(&self, spec: ChildSpec) -> Result<ActorHandle> {
        self.request(|reply| PoolCommand::StartChild { spec, reply })
            .await?
    }

    pub async fn terminate_child(&self, id: ActorId) -> Result<()> {
        self.request(|reply| PoolCommand::TerminateChild { id, reply })
            .await?
    }

    pub async fn which_children(&self) -> Result<Vec<ChildInfo>> {
        self.request(|reply| PoolCommand::WhichChildren { reply })
            .await
    }

    /// Stop every child and end the pool
    pub async fn stop(&self) -> Result<()> {
        self.sender
            .send(PoolCommand::Stop)
            .await
            .map_err(|_| NodeError::PoolUnavailable)
    }
}

/// Follows the pool published by the group supervisor
#[derive(Clone, Debug)]
pub struct PoolClient {
    current: watch::Receiver<Option<PoolHandle>>,
}

impl PoolClient {
    pub(crate) fn new(current: watch::Receiver<Option<PoolHandle>>) -> Self {
        Self { current }
    }

    pub fn current(&self) -> Result<PoolHandle> {
        self.current
            .borrow()
            .clone()
            .filter(|handle| !handle.sender.is_closed())
            .ok_or(NodeError::PoolUnavailable)
    }
}
