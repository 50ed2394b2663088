//! Error types and handling for the tool fleet.
//!
//! This module defines a unified error type that can represent errors from
//! the operations domain, the transport, and the fleet supervisor/router,
//! providing consistent error handling across both binaries.

use thiserror::Error;

/// A specialized Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the operations domain.
    #[error("Operation error: {0}")]
    Operation(#[from] crate::domains::operations::OperationError),

    /// Error originating from the HTTP transport.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Error originating from the fleet supervisor or call router.
    #[error("Fleet error: {0}")]
    Fleet(#[from] crate::fleet::FleetError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
