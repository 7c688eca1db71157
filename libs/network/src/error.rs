//! Router Error Types

use crate::routing::HandlerKey;
use thiserror::Error;

/// Error returned by a [`MessageHandler`](crate::MessageHandler)
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the global router and the handlers registered with it
#[derive(Error, Debug)]
pub enum TransportError {
    /// Nothing is registered for the key, and no catch-all either
    #[error("No message handler registered for {key}")]
    NoHandler { key: HandlerKey },

    /// A registered handler rejected the message
    #[error("Handler for {key} failed: {source}")]
    Handler { key: HandlerKey, source: HandlerError },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// The router (or something behind it) has shut down
    #[error("Router closed: {message}")]
    Closed { message: String },
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a missing handler error
    pub fn no_handler(key: HandlerKey) -> Self {
        Self::NoHandler { key }
    }

    /// Wrap a handler failure, keeping the original error as source
    pub fn handler(key: HandlerKey, source: impl Into<HandlerError>) -> Self {
        Self::Handler {
            key,
            source: source.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a closed error
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Original handler error, for callers that need to inspect it
    pub fn handler_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TransportError::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Check if retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::NoHandler { .. } => true,
            TransportError::Closed { .. } => false,
            TransportError::Handler { .. } => false,
            TransportError::Configuration { .. } => false,
        }
    }
}
