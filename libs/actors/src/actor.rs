//! Actor identities, handles and mailboxes

use mesh_types::Message;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    /// Create new actor ID
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Get UUID
    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of an actor's mailbox.
///
/// Handles compare by actor id. Delivery never waits: the mailbox is
/// unbounded, and a closed mailbox means the actor is gone.
#[derive(Clone)]
pub struct ActorHandle {
    id: ActorId,
    sender: mpsc::UnboundedSender<Message>,
}

/// Receiving side of an actor's mailbox
#[derive(Debug)]
pub struct Mailbox {
    id: ActorId,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl ActorHandle {
    /// Create a fresh actor identity with its mailbox
    pub fn channel() -> (ActorHandle, Mailbox) {
        let id = ActorId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        (ActorHandle { id, sender }, Mailbox { id, receiver })
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// True once the mailbox has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Enqueue without waiting; hands the message back if the actor is gone
    pub(crate) fn deliver(&self, message: Message) -> std::result::Result<(), Message> {
        self.sender.send(message).map_err(|e| e.0)
    }
}

impl PartialEq for ActorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorHandle {}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Mailbox {
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Next message, or `None` once every handle is gone
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}
