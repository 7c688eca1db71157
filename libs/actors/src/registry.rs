//! Address Registry
//!
//! Single source of truth for address to actor bindings. The table is owned
//! by one task; every operation is a command sent to that task, answered on
//! a oneshot channel. No locks guard the table: all mutation is serialized
//! through the owner.
//!
//! The registry is replaced wholesale when its supervision group restarts.
//! Callers reach whichever instance is current through [`RegistryClient`].

use crate::actor::{ActorHandle, ActorId};
use crate::{NodeError, Result};
use mesh_types::{Address, Message};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) enum RegistryCommand {
    Register {
        address: Address,
        handle: ActorHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    Unregister {
        address: Address,
        reply: oneshot::Sender<()>,
    },
    /// Release only if still bound to `owner`; used when a worker exits
    UnregisterOwned {
        address: Address,
        owner: ActorId,
    },
    Lookup {
        address: Address,
        reply: oneshot::Sender<Option<ActorHandle>>,
    },
    Send {
        address: Address,
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    Addresses {
        reply: oneshot::Sender<Vec<Address>>,
    },
    Stop,
}

/// Registry state, owned by its task
struct Registry {
    generation: u64,
    entries: HashMap<Address, ActorHandle>,
}

impl Registry {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RegistryCommand>) {
        info!(generation = self.generation, "Address registry started");

        while let Some(command) = commands.recv().await {
            match command {
                RegistryCommand::Register {
                    address,
                    handle,
                    reply,
                } => {
                    let _ = reply.send(self.register(address, handle));
                }
                RegistryCommand::Unregister { address, reply } => {
                    if self.entries.remove(&address).is_some() {
                        debug!(address = %address, "Address unregistered");
                    }
                    let _ = reply.send(());
                }
                RegistryCommand::UnregisterOwned { address, owner } => {
                    if self
                        .entries
                        .get(&address)
                        .is_some_and(|handle| handle.id() == owner)
                    {
                        self.entries.remove(&address);
                        debug!(address = %address, actor = %owner, "Released worker address");
                    }
                }
                RegistryCommand::Lookup { address, reply } => {
                    let _ = reply.send(self.live_handle(&address).cloned());
                }
                RegistryCommand::Send {
                    address,
                    message,
                    reply,
                } => {
                    let _ = reply.send(self.send(address, message));
                }
                RegistryCommand::Addresses { reply } => {
                    self.entries.retain(|_, handle| !handle.is_closed());
                    let _ = reply.send(self.entries.keys().cloned().collect());
                }
                RegistryCommand::Stop => break,
            }
        }

        info!(
            generation = self.generation,
            dropped = self.entries.len(),
            "Address registry stopped"
        );
    }

    fn register(&mut self, address: Address, handle: ActorHandle) -> Result<()> {
        if let Some(existing) = self.entries.get(&address) {
            if !existing.is_closed() {
                return Err(NodeError::AlreadyRegistered(address));
            }
            warn!(address = %address, stale = %existing.id(), "Replacing binding of a dead actor");
        }

        debug!(address = %address, actor = %handle.id(), "Address registered");
        self.entries.insert(address, handle);
        Ok(())
    }

    /// Live handle for `address`, pruning the entry if its actor is gone
    fn live_handle(&mut self, address: &Address) -> Option<&ActorHandle> {
        if self.entries.get(address).is_some_and(ActorHandle::is_closed) {
            warn!(address = %address, "Pruning binding of a dead actor");
            self.entries.remove(address);
        }
        self.entries.get(address)
    }

    fn send(&mut self, address: Address, message: Message) -> Result<()> {
        let Some(handle) = self.live_handle(&address) else {
            return Err(NodeError::NotFound(address));
        };

        if handle.deliver(message).is_err() {
            // Mailbox closed between the check and the send
            self.entries.remove(&address);
            return Err(NodeError::NotFound(address));
        }
        Ok(())
    }
}

/// Spawn a fresh, empty registry on the current runtime
pub fn spawn_registry(generation: u64) -> (RegistryHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let registry = Registry {
        generation,
        entries: HashMap::new(),
    };
    let task = tokio::spawn(registry.run(receiver));
    (RegistryHandle { sender, generation }, task)
}

/// Handle to one registry instance
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    sender: mpsc::UnboundedSender<RegistryCommand>,
    generation: u64,
}

impl RegistryHandle {
    /// Group generation this instance belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn submit(&self, command: RegistryCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| NodeError::RegistryUnavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.submit(command(reply))?;
        response.await.map_err(|_| NodeError::RegistryUnavailable)
    }

    /// Bind `address` to `handle`; fails if a live binding exists
    pub async fn register(&self, address: Address, handle: ActorHandle) -> Result<()> {
        self.request(|reply| RegistryCommand::Register {
            address,
            handle,
            reply,
        })
        .await?
    }

    /// Remove any binding for `address`. Idempotent.
    pub async fn unregister(&self, address: Address) -> Result<()> {
        self.request(|reply| RegistryCommand::Unregister { address, reply })
            .await
    }

    pub(crate) fn release(&self, address: Address, owner: ActorId) -> Result<()> {
        self.submit(RegistryCommand::UnregisterOwned { address, owner })
    }

    pub async fn lookup(&self, address: Address) -> Result<Option<ActorHandle>> {
        self.request(|reply| RegistryCommand::Lookup { address, reply })
            .await
    }

    /// Enqueue `message` in the mailbox bound to `address`.
    ///
    /// Returns once the message is enqueued, not when it is processed.
    pub async fn send(&self, address: Address, message: Message) -> Result<()> {
        self.request(|reply| RegistryCommand::Send {
            address,
            message,
            reply,
        })
        .await?
    }

    /// Snapshot of currently bound addresses
    pub async fn addresses(&self) -> Result<Vec<Address>> {
        self.request(|reply| RegistryCommand::Addresses { reply })
            .await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.addresses().await?.len())
    }

    /// Terminate this instance. Every binding it holds is discarded.
    pub fn stop(&self) -> Result<()> {
        self.submit(RegistryCommand::Stop)
    }
}

/// Follows the registry published by the group supervisor
#[derive(Clone, Debug)]
pub struct RegistryClient {
    current: watch::Receiver<Option<RegistryHandle>>,
}

impl RegistryClient {
    pub(crate) fn new(current: watch::Receiver<Option<RegistryHandle>>) -> Self {
        Self { current }
    }

    /// The live registry, or `RegistryUnavailable` while the group restarts
    pub fn current(&self) -> Result<RegistryHandle> {
        self.current
            .borrow()
            .clone()
            .filter(|handle| !handle.is_closed())
            .ok_or(NodeError::RegistryUnavailable)
    }

    pub async fn register(&self, address: Address, handle: ActorHandle) -> Result<()> {
        self.current()?.register(address, handle).await
    }

    pub async fn unregister(&self, address: Address) -> Result<()> {
        self.current()?.unregister(address).await
    }

    pub async fn lookup(&self, address: Address) -> Result<Option<ActorHandle>> {
        self.current()?.lookup(address).await
    }

    pub async fn send(&self, address: Address, message: Message) -> Result<()> {
        self.current()?.send(address, message).await
    }

    pub async fn addresses(&self) -> Result<Vec<Address>> {
        self.current()?.addresses().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::Route;

    fn addr(byte: u8) -> Address {
        Address::from([byte, 0, 0, byte])
    }

    #[tokio::test]
    async fn test_register_lookup_unregister() {
        let (registry, _task) = spawn_registry(1);
        let (handle, _mailbox) = ActorHandle::channel();

        registry.register(addr(1), handle.clone()).await.unwrap();
        assert_eq!(registry.lookup(addr(1)).await.unwrap(), Some(handle));

        registry.unregister(addr(1)).await.unwrap();
        assert_eq!(registry.lookup(addr(1)).await.unwrap(), None);

        // Idempotent
        registry.unregister(addr(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_original() {
        let (registry, _task) = spawn_registry(1);
        let (first, _first_mailbox) = ActorHandle::channel();
        let (second, _second_mailbox) = ActorHandle::channel();

        registry.register(addr(2), first.clone()).await.unwrap();
        let err = registry.register(addr(2), second).await.unwrap_err();

        assert!(matches!(err, NodeError::AlreadyRegistered(a) if a == addr(2)));
        assert_eq!(registry.lookup(addr(2)).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_dead_binding_is_pruned_and_replaceable() {
        let (registry, _task) = spawn_registry(1);
        let (dead, mailbox) = ActorHandle::channel();
        registry.register(addr(3), dead).await.unwrap();
        drop(mailbox);

        let (live, _live_mailbox) = ActorHandle::channel();
        registry.register(addr(3), live.clone()).await.unwrap();
        assert_eq!(registry.lookup(addr(3)).await.unwrap(), Some(live));

        let (gone, gone_mailbox) = ActorHandle::channel();
        registry.register(addr(4), gone).await.unwrap();
        drop(gone_mailbox);
        assert_eq!(registry.lookup(addr(4)).await.unwrap(), None);
        assert_eq!(registry.addresses().await.unwrap(), vec![addr(3)]);
    }

    #[tokio::test]
    async fn test_send_preserves_order() {
        let (registry, _task) = spawn_registry(1);
        let (handle, mut mailbox) = ActorHandle::channel();
        registry.register(addr(5), handle).await.unwrap();

        for byte in 0..20u8 {
            let message = Message::new(vec![addr(5)], Route::empty(), vec![byte]);
            registry.send(addr(5), message).await.unwrap();
        }
        for byte in 0..20u8 {
            assert_eq!(mailbox.recv().await.unwrap().payload().as_ref(), &[byte]);
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_address() {
        let (registry, _task) = spawn_registry(1);
        let (handle, mut mailbox) = ActorHandle::channel();
        registry.register(addr(6), handle).await.unwrap();

        let message = Message::new(vec![addr(7)], Route::empty(), vec![0u8]);
        let err = registry.send(addr(7), message).await.unwrap_err();

        assert!(matches!(err, NodeError::NotFound(a) if a == addr(7)));
        assert!(mailbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_release_requires_owner() {
        let (registry, _task) = spawn_registry(1);
        let (owner, _owner_mailbox) = ActorHandle::channel();
        let (other, _other_mailbox) = ActorHandle::channel();
        registry.register(addr(8), owner.clone()).await.unwrap();

        registry.release(addr(8), other.id()).unwrap();
        assert!(registry.lookup(addr(8)).await.unwrap().is_some());

        registry.release(addr(8), owner.id()).unwrap();
        assert!(registry.lookup(addr(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_makes_registry_unavailable() {
        let (registry, task) = spawn_registry(1);
        registry.stop().unwrap();
        task.await.unwrap();

        assert!(registry.is_closed());
        assert!(matches!(
            registry.lookup(addr(9)).await,
            Err(NodeError::RegistryUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_client_follows_published_registry() {
        let (publish, current) = watch::channel(None);
        let client = RegistryClient::new(current);
        assert!(matches!(client.current(), Err(NodeError::RegistryUnavailable)));

        let (registry, _task) = spawn_registry(7);
        publish.send_replace(Some(registry));
        assert_eq!(client.current().unwrap().generation(), 7);

        let (handle, _mailbox) = ActorHandle::channel();
        client.register(addr(10), handle).await.unwrap();
        assert_eq!(client.addresses().await.unwrap(), vec![addr(10)]);
    }
}
