//! Node Configuration Module
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `MESH_`-prefixed environment variables (`MESH_POOL__MAX_RESTARTS=10`).

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Complete node configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub allocator: AllocatorSettings,
    pub supervision: SupervisionSettings,
    pub pool: PoolSettings,
    pub logging: LoggingSettings,
}

/// Identity of this node in logs
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NodeSettings {
    pub name: String,
}

/// Random address allocation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AllocatorSettings {
    /// Length of generated addresses in bytes
    pub address_length: usize,
    /// Draws before giving up on finding a free address
    pub max_attempts: u32,
}

/// One-for-all restart intensity for the registry + worker pool group
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisionSettings {
    pub max_restarts: u32,
    pub restart_window_secs: u64,
}

/// One-for-one restart intensity for dynamically started workers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    pub command_buffer: usize,
    pub max_restarts: u32,
    pub restart_window_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
        }
    }
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            address_length: 4,
            max_attempts: 64,
        }
    }
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_window_secs: 5,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            max_restarts: 5,
            restart_window_secs: 60,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SupervisionSettings {
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

impl PoolSettings {
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

impl NodeConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&NodeConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            info!("Loading node config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables (MESH_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("MESH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(?config, "Node configuration loaded");
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let defaults = Config::try_from(&NodeConfig::default())
            .context("Failed to serialize default configuration")?;

        let config: NodeConfig = Config::builder()
            .add_source(defaults)
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to write out a starting config file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Reject values the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.node.name.trim().is_empty() {
            bail!("node.name must not be empty");
        }
        if self.pool.command_buffer == 0 {
            bail!("pool.command_buffer must be at least 1");
        }
        if self.allocator.address_length == 0 {
            bail!("allocator.address_length must be at least 1 byte");
        }
        if self.allocator.max_attempts == 0 {
            bail!("allocator.max_attempts must be at least 1");
        }
        if self.supervision.restart_window_secs == 0 {
            bail!("supervision.restart_window_secs must be at least 1");
        }
        if self.pool.restart_window_secs == 0 {
            bail!("pool.restart_window_secs must be at least 1");
        }
        Ok(())
    }
}
