//! # Mesh Types
//!
//! Plain data shared by the node control plane and its collaborators.
//!
//! - [`Address`]: opaque byte string naming a local endpoint
//! - [`Route`]: ordered list of addresses a message still has to traverse
//! - [`Message`]: immutable `(onward_route, return_route, payload)` record
//! - [`ControlInstruction`]: the single-byte liveness protocol (`PING`/`PONG`)
//!
//! Nothing here performs I/O. Encoding messages for the wire belongs to the
//! codec, which lives outside this workspace.
//!
//! ```rust
//! use mesh_types::{Address, Message, Route, PING, PONG};
//!
//! let ping = Message::new(Route::empty(), Route::from(vec![Address::from([7u8])]), vec![PING]);
//! let pong = ping.pong();
//!
//! assert_eq!(pong.onward_route().head(), Some(&Address::from([7u8])));
//! assert_eq!(pong.payload().as_ref(), &[PONG]);
//! ```

pub mod address;
pub mod control;
pub mod message;
pub mod route;

pub use address::{Address, AddressParseError};
pub use control::{ControlInstruction, PING, PONG};
pub use message::Message;
pub use route::Route;
