//! Node Error Types
//!
//! Every failure the control plane reports is a local, recoverable outcome
//! returned to the immediate caller. Crashes are not represented here: they
//! end the owning task and are handled by supervision.

use crate::actor::ActorId;
use bytes::Bytes;
use mesh_network::TransportError;
use mesh_types::{Address, Message, Route};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    /// Target address has no live registration
    #[error("Address {0} is not registered")]
    NotFound(Address),

    /// Address already bound to a live handle
    #[error("Address {0} is already registered")]
    AlreadyRegistered(Address),

    /// Onward route cannot be forwarded or consumed
    #[error("Unexpected onward route {0}")]
    UnexpectedOnwardRoute(Route),

    /// Node-directed message with an unknown payload; the message is dropped
    #[error("Unexpected control instruction 0x{}", hex::encode(.payload))]
    UnexpectedControlInstruction { payload: Bytes, message: Message },

    /// Worker could not be created or failed during startup
    #[error("Failed to start worker {kind}: {reason}")]
    Start { kind: String, reason: String },

    /// Registry is restarting or the node is stopped
    #[error("Address registry unavailable")]
    RegistryUnavailable,

    /// Worker pool is restarting or the node is stopped
    #[error("Worker pool unavailable")]
    PoolUnavailable,

    #[error("No supervised worker {0}")]
    UnknownChild(ActorId),

    #[error("Invalid address length {0}: must be at least 1 byte")]
    InvalidAddressLength(usize),

    /// No free address found within the retry budget
    #[error("No unregistered {length}-byte address found after {attempts} attempts")]
    AllocationExhausted { length: usize, attempts: u32 },

    /// A supervisor gave up after too many restarts
    #[error("Restart intensity exceeded for {member}")]
    RestartIntensityExceeded { member: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Failure raised by worker code
    #[error("Worker error: {0}")]
    Worker(String),

    #[error(transparent)]
    Router(#[from] TransportError),
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

impl NodeError {
    pub fn start(kind: impl Into<String>, reason: impl ToString) -> Self {
        Self::Start {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    /// Short label for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            NodeError::NotFound(_) => "not_found",
            NodeError::AlreadyRegistered(_) => "already_registered",
            NodeError::UnexpectedOnwardRoute(_) => "unexpected_onward_route",
            NodeError::UnexpectedControlInstruction { .. } => "unexpected_control_instruction",
            NodeError::Start { .. } => "start",
            NodeError::RegistryUnavailable | NodeError::PoolUnavailable => "unavailable",
            NodeError::UnknownChild(_) => "unknown_child",
            NodeError::InvalidAddressLength(_) | NodeError::AllocationExhausted { .. } => {
                "allocation"
            }
            NodeError::RestartIntensityExceeded { .. } => "supervision",
            NodeError::Configuration(_) => "configuration",
            NodeError::Worker(_) => "worker",
            NodeError::Router(_) => "router",
        }
    }
}
