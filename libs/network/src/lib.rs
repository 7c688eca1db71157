//! Global Router Seam
//!
//! The node control plane does not own first-hop dispatch. An external global
//! router decides which node-level handler receives a message based on a
//! handler key, and the node registers its dispatch logic there at startup.
//!
//! This crate holds that contract ([`GlobalRouter`], [`MessageHandler`],
//! [`HandlerKey`]) plus [`LocalRouter`], an in-process implementation used
//! when the node is embedded without a transport.

pub mod error;
pub mod routing;

pub use error::{HandlerError, Result, TransportError};
pub use routing::{GlobalRouter, HandlerKey, LocalRouter, MessageHandler};
