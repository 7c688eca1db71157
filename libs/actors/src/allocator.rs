//! Random Address Allocator
//!
//! Rejection sampling over OS randomness: draw, check the registry, redraw.
//! The number of draws is capped; running out is reported as
//! [`NodeError::AllocationExhausted`] instead of looping forever.

use crate::registry::RegistryClient;
use crate::{NodeError, Result};
use mesh_config::AllocatorSettings;
use mesh_types::Address;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AddressAllocator {
    registry: RegistryClient,
    max_attempts: u32,
}

impl AddressAllocator {
    pub fn new(registry: RegistryClient, max_attempts: u32) -> Self {
        Self {
            registry,
            max_attempts,
        }
    }

    pub fn from_settings(registry: RegistryClient, settings: &AllocatorSettings) -> Self {
        Self::new(registry, settings.max_attempts)
    }

    /// Address of `length` random bytes with no live binding at the time of the check.
    ///
    /// Nothing is reserved: a concurrent `register` may still claim the
    /// address before the caller does.
    pub async fn generate_unregistered_address(&self, length: usize) -> Result<Address> {
        if length == 0 {
            return Err(NodeError::InvalidAddressLength(length));
        }

        let registry = self.registry.current()?;
        for attempt in 1..=self.max_attempts {
            let candidate = random_address(length);
            if registry.lookup(candidate.clone()).await?.is_none() {
                debug!(address = %candidate, attempt, "Allocated random address");
                return Ok(candidate);
            }
        }

        warn!(length, attempts = self.max_attempts, "Random address allocation exhausted");
        Err(NodeError::AllocationExhausted {
            length,
            attempts: self.max_attempts,
        })
    }
}

/// Draw `length` bytes from the operating system's CSPRNG
pub fn random_address(length: usize) -> Address {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    Address::new(bytes)
}
