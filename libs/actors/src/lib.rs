//! Node Control Plane
//!
//! Keeps the mapping from logical addresses to live local actors, forwards
//! messages one hop along their embedded route, and answers the liveness
//! protocol for messages whose route ends at the node.
//!
//! # Architecture
//!
//! ```text
//!  global router ──(default key, key 0)──▶ MessageRouter
//!                                            │        │
//!                              onward route  │        │ empty route
//!                                            ▼        ▼
//!                                      Registry   ControlHandler ──▶ global router
//!                                            │         (PING → PONG)
//!                                            ▼
//!                                     actor mailboxes
//!
//!  GroupSupervisor (one-for-all)
//!   ├── Registry      single owning task, address → handle
//!   └── WorkerPool    one-for-one, children started on demand
//! ```
//!
//! An address resolves to exactly one live actor or to nothing. A crash of
//! the registry or the pool restarts both and discards every binding;
//! callers re-register afterwards.
//!
//! # Examples
//!
//! ```rust
//! use mesh_config::NodeConfig;
//! use mesh_network::LocalRouter;
//! use mesh_node::{ActorHandle, Node};
//! use mesh_types::{Message, Route};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> mesh_node::Result<()> {
//! let node = Node::start(NodeConfig::default(), Arc::new(LocalRouter::new())).await?;
//!
//! let (handle, mut mailbox) = ActorHandle::channel();
//! let address = node.get_random_unregistered_address().await?;
//! node.register_address(address.clone(), handle).await?;
//!
//! let message = Message::new(vec![address.clone()], Route::empty(), vec![42u8]);
//! node.dispatch(message.clone()).await?;
//! assert_eq!(mailbox.recv().await, Some(message));
//!
//! node.shutdown().await
//! # }
//! ```

pub mod actor;
pub mod allocator;
pub mod control;
pub mod error;
pub mod metrics;
pub mod node;
pub mod pool;
pub mod registry;
pub mod router;
pub mod supervision;
mod supervisor;
pub mod worker;

pub use actor::{ActorHandle, ActorId, Mailbox};
pub use allocator::AddressAllocator;
pub use control::ControlHandler;
pub use error::{NodeError, Result};
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use node::{Node, HANDLER_KEYS};
pub use pool::{ChildInfo, PoolClient, PoolHandle};
pub use registry::{RegistryClient, RegistryHandle};
pub use router::{classify, Dispatch, MessageRouter};
pub use supervision::{ExitReason, GroupMember, RestartIntensity, RestartPolicy};
pub use worker::{ChildSpec, Worker, WorkerContext, WorkerKind};
