//! # Mesh Node Configuration
//!
//! Settings for the node control plane: worker pool sizing, address
//! allocation limits, restart intensities and logging.
//!
//! ```rust
//! use mesh_config::NodeConfig;
//!
//! let config = NodeConfig::from_toml_str(r#"
//! [allocator]
//! max_attempts = 16
//! "#).unwrap();
//!
//! assert_eq!(config.allocator.max_attempts, 16);
//! assert_eq!(config.allocator.address_length, 4);
//! ```

pub mod logging;
pub mod node_config;

pub use logging::init_tracing;
pub use node_config::{
    AllocatorSettings, LoggingSettings, NodeConfig, NodeSettings, PoolSettings,
    SupervisionSettings,
};
