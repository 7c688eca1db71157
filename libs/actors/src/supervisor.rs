//! One-for-all group supervisor
//!
//! The registry and the worker pool form one fault domain: pool children
//! are only reachable through registry bindings, so losing either member
//! invalidates the other. When one exits unexpectedly, both are torn down
//! and a fresh pair is started under the next generation number.
//!
//! Each generation is published through `watch` channels. Between teardown
//! and republication the channels hold `None`, and callers see
//! `RegistryUnavailable` / `PoolUnavailable`.

use crate::metrics::NodeMetrics;
use crate::pool::{spawn_pool, PoolEnvironment, PoolHandle};
use crate::registry::{spawn_registry, RegistryClient, RegistryHandle};
use crate::supervision::{GroupMember, RestartIntensity};
use crate::{NodeError, Result};
use mesh_config::NodeConfig;
use mesh_network::GlobalRouter;
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

/// Channels the supervisor publishes each generation on
pub(crate) struct Publication {
    pub registry: watch::Sender<Option<RegistryHandle>>,
    pub pool: watch::Sender<Option<PoolHandle>>,
    pub generation: watch::Sender<u64>,
}

impl Publication {
    fn publish(&self, generation: u64, registry: RegistryHandle, pool: PoolHandle) {
        self.registry.send_replace(Some(registry));
        self.pool.send_replace(Some(pool));
        self.generation.send_replace(generation);
    }

    fn withdraw(&self) {
        self.pool.send_replace(None);
        self.registry.send_replace(None);
    }
}

pub(crate) struct GroupSupervisor {
    config: NodeConfig,
    router: Weak<dyn GlobalRouter>,
    metrics: Arc<NodeMetrics>,
    publication: Publication,
}

impl GroupSupervisor {
    pub fn new(
        config: NodeConfig,
        router: Weak<dyn GlobalRouter>,
        metrics: Arc<NodeMetrics>,
        publication: Publication,
    ) -> Self {
        Self {
            config,
            router,
            metrics,
            publication,
        }
    }

    /// Run generations until `shutdown` fires or restart intensity is exceeded
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        let supervision = &self.config.supervision;
        let mut intensity =
            RestartIntensity::new(supervision.max_restarts, supervision.restart_window());
        let mut generation = 0u64;

        loop {
            generation += 1;

            // Start order: registry, then pool
            let (registry, mut registry_task) = spawn_registry(generation);
            let env = PoolEnvironment {
                registry: RegistryClient::new(self.publication.registry.subscribe()),
                router: self.router.clone(),
                metrics: self.metrics.clone(),
                max_attempts: self.config.allocator.max_attempts,
            };
            let (pool, mut pool_task) = spawn_pool(generation, env, &self.config.pool);

            self.publication
                .publish(generation, registry.clone(), pool.clone());
            info!(
                node = %self.config.node.name,
                generation,
                "Supervision group started"
            );

            // A member that already exited wins over a pending shutdown
            let failed = tokio::select! {
                biased;

                result = &mut registry_task => {
                    self.publication.withdraw();
                    match result {
                        Ok(()) => warn!(generation, "Address registry exited"),
                        Err(e) => error!(generation, error = %e, "Address registry crashed"),
                    }
                    pool_task.abort();
                    let _ = pool_task.await;
                    GroupMember::Registry
                }
                result = &mut pool_task => {
                    self.publication.withdraw();
                    match result {
                        Ok(Ok(())) => warn!(generation, "Worker pool exited"),
                        Ok(Err(e)) => error!(generation, error = %e, "Worker pool failed"),
                        Err(e) => error!(generation, error = %e, "Worker pool crashed"),
                    }
                    registry_task.abort();
                    let _ = registry_task.await;
                    GroupMember::WorkerPool
                }
                _ = &mut shutdown => {
                    self.publication.withdraw();
                    // Reverse start order
                    if pool.stop().await.is_ok() {
                        let _ = pool_task.await;
                    }
                    if registry.stop().is_ok() {
                        let _ = registry_task.await;
                    }
                    info!(node = %self.config.node.name, generation, "Supervision group stopped");
                    return Ok(());
                }
            };

            if !intensity.allow_restart() {
                error!(
                    node = %self.config.node.name,
                    member = %failed,
                    restart_count = intensity.count(),
                    max_restarts = intensity.max_restarts(),
                    "Supervision group exceeded restart limit, giving up"
                );
                return Err(NodeError::RestartIntensityExceeded {
                    member: failed.to_string(),
                });
            }

            self.metrics.record_group_restart();
            warn!(
                node = %self.config.node.name,
                member = %failed,
                generation,
                "Restarting supervision group"
            );
        }
    }
}
