//! Immutable routed messages.

use crate::{Address, Route, PONG};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A routed message.
///
/// Fields are fixed at construction. Every transformation below builds a new
/// value, so a message handed to one actor can never be changed under
/// another one holding the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    onward_route: Route,
    return_route: Route,
    payload: Bytes,
}

impl Message {
    pub fn new(
        onward_route: impl Into<Route>,
        return_route: impl Into<Route>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            onward_route: onward_route.into(),
            return_route: return_route.into(),
            payload: payload.into(),
        }
    }

    /// Remaining hops towards the destination
    pub fn onward_route(&self) -> &Route {
        &self.onward_route
    }

    /// Hops a reply should take back to the sender
    pub fn return_route(&self) -> &Route {
        &self.return_route
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_parts(self) -> (Route, Route, Bytes) {
        (self.onward_route, self.return_route, self.payload)
    }

    /// True when `address` is the next hop of this message
    pub fn is_addressed_to(&self, address: &Address) -> bool {
        self.onward_route.head() == Some(address)
    }

    /// Reply travelling back along this message's return route
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self::new(self.return_route.clone(), Route::empty(), payload)
    }

    /// Liveness answer to a ping
    pub fn pong(&self) -> Self {
        self.reply(vec![PONG])
    }

    /// Consume one hop on behalf of the receiver at `via`.
    ///
    /// The head of the onward route is dropped and `via` is pushed onto the
    /// return route so replies find their way back through the same hop.
    pub fn advance(&self, via: Address) -> Self {
        Self {
            onward_route: self.onward_route.tail(),
            return_route: self.return_route.prepended(via),
            payload: self.payload.clone(),
        }
    }
}
