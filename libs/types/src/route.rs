//! Ordered hop lists carried by every message.

use crate::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered sequence of addresses, first hop first.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route(Vec<Address>);

impl Route {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn head(&self) -> Option<&Address> {
        self.0.first()
    }

    /// Head and remaining hops, or `None` for an empty route
    pub fn split_first(&self) -> Option<(&Address, &[Address])> {
        self.0.split_first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Address> {
        self.0.iter()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.0
    }

    /// New route with `address` in front of the current hops
    pub fn prepended(&self, address: Address) -> Self {
        let mut addresses = Vec::with_capacity(self.0.len() + 1);
        addresses.push(address);
        addresses.extend(self.0.iter().cloned());
        Self(addresses)
    }

    /// New route without the first hop
    pub fn tail(&self) -> Self {
        Self(self.0.iter().skip(1).cloned().collect())
    }
}

impl From<Vec<Address>> for Route {
    fn from(addresses: Vec<Address>) -> Self {
        Self(addresses)
    }
}

impl FromIterator<Address> for Route {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Route {
    type Item = &'a Address;
    type IntoIter = std::slice::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, address) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " => ")?;
            }
            write!(f, "{}", address)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route{}", self)
    }
}
