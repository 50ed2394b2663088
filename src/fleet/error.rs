//! Fleet error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the supervisor and the call router.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A server did not reach `Healthy`; the fleet was rolled back.
    #[error("server '{id}' failed to start: {reason}")]
    ServerStartupFailed { id: String, reason: String },

    /// The server is not `Healthy` (starting, unhealthy, stopping or stopped).
    #[error("server '{id}' is unavailable")]
    ServerUnavailable { id: String },

    /// No descriptor with this id is configured.
    #[error("unknown server '{id}'")]
    UnknownServer { id: String },

    /// No server advertises the operation.
    #[error("no server advertises operation '{operation}'")]
    RoutingError { operation: String },

    /// Two servers advertise the same operation.
    #[error("operation '{operation}' is advertised by both '{first}' and '{second}'")]
    DuplicateRoute {
        operation: String,
        first: String,
        second: String,
    },

    /// The call exceeded its timeout on every permitted attempt.
    #[error("operation '{operation}' timed out after {}ms", .elapsed.as_millis())]
    Timeout { operation: String, elapsed: Duration },

    /// The tool server answered with an error envelope.
    #[error("remote operation error: {message}")]
    RemoteOperationError { message: String },

    /// Connection failure or unreadable response.
    #[error("transport error talking to '{server}': {reason}")]
    Transport { server: String, reason: String },
}

impl FleetError {
    pub fn startup_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServerStartupFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(id: impl Into<String>) -> Self {
        Self::ServerUnavailable { id: id.into() }
    }

    pub fn unknown_server(id: impl Into<String>) -> Self {
        Self::UnknownServer { id: id.into() }
    }

    pub fn routing(operation: impl Into<String>) -> Self {
        Self::RoutingError {
            operation: operation.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteOperationError {
            message: message.into(),
        }
    }

    pub fn transport(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            server: server.into(),
            reason: reason.into(),
        }
    }
}
