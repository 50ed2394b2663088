//! Operation-specific error types.

use thiserror::Error;

/// Errors raised by the operation registry.
///
/// `UnknownOperation` and `InvalidParameters` are client faults and their
/// messages are safe to return to callers. `HandlerFailure` is a server fault:
/// its `detail` is for local logs only, see [`OperationError::public_message`].
#[derive(Debug, Error)]
pub enum OperationError {
    /// An operation with this name is already registered.
    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    /// The operation's parameter schema does not compile.
    #[error("Invalid schema for '{operation}': {reason}")]
    InvalidSchema { operation: String, reason: String },

    /// The requested operation is not registered.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Parameters failed schema validation or handler-level validation.
    #[error("Invalid parameters for '{operation}': {reason}")]
    InvalidParameters { operation: String, reason: String },

    /// The handler failed for a reason other than bad input.
    #[error("Handler failure in '{operation}': {detail}")]
    HandlerFailure { operation: String, detail: String },
}

impl OperationError {
    /// Create a new "duplicate operation" error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateOperation(name.into())
    }

    /// Create a new "unknown operation" error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownOperation(name.into())
    }

    /// Create a new "invalid schema" error.
    pub fn invalid_schema(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new "invalid parameters" error.
    pub fn invalid_parameters(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new "handler failure" error.
    pub fn handler_failure(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::HandlerFailure {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Message that may cross the protocol boundary.
    pub fn public_message(&self) -> String {
        match self {
            Self::HandlerFailure { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error returned by an operation handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Domain validation failed (bad input the schema cannot express).
    #[error("{0}")]
    Invalid(String),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Create a new validation error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}
