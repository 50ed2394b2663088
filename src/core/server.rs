//! Tool server implementation.
//!
//! A `ToolServer` owns one operation registry and turns request envelopes
//! into response envelopes. The HTTP transport in `core/transport/http.rs`
//! wraps it; nothing in here knows about sockets.
//!
//! Error mapping:
//! - `UnknownOperation` / `InvalidParameters` -> error envelope with the message
//! - `HandlerFailure` -> error envelope with `"internal error"`, detail logged

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::config::Config;
use super::envelope::{RequestEnvelope, ResponseEnvelope};
use super::error::{Error, Result};
use crate::domains::operations::definitions::{build_registry, operations_for};
use crate::domains::operations::{OperationDescriptor, OperationError, OperationRegistry};

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
}

impl HealthReport {
    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// A single tool server: one id, one registry.
#[derive(Clone)]
pub struct ToolServer {
    id: String,
    version: String,
    registry: Arc<OperationRegistry>,
}

impl ToolServer {
    /// Create a tool server around an already-built registry.
    pub fn new(id: impl Into<String>, registry: OperationRegistry) -> Self {
        Self {
            id: id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            registry: Arc::new(registry),
        }
    }

    /// Create the built-in tool server named by `config.server.id`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let id = &config.server.id;
        let operations = operations_for(id).ok_or_else(|| {
            Error::config(format!("unknown tool server id '{id}'"))
        })?;
        let registry = build_registry(operations)?;
        info!("Tool server '{}' registered {} operation(s)", id, registry.len());
        Ok(Self::new(id.clone(), registry))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Liveness report. Answering at all means the event loop is responsive.
    pub fn health(&self) -> HealthReport {
        HealthReport::healthy(&self.id)
    }

    /// Operations this server advertises.
    pub fn catalog(&self) -> Vec<OperationDescriptor> {
        self.registry.catalog()
    }

    /// Dispatch one request. Never panics and never fails the server.
    #[instrument(skip_all, fields(service = %self.id, operation = %request.operation_name()))]
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        match self
            .registry
            .invoke(request.operation_name(), request.parameters())
            .await
        {
            Ok(data) => {
                info!("Operation succeeded");
                ResponseEnvelope::success(data)
            }
            Err(err @ OperationError::HandlerFailure { .. }) => {
                error!("Operation failed: {}", err);
                ResponseEnvelope::error(err.public_message())
            }
            Err(err) => {
                warn!("Operation rejected: {}", err);
                ResponseEnvelope::error(err.public_message())
            }
        }
    }
}

impl std::fmt::Debug for ToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServer")
            .field("id", &self.id)
            .field("operations", &self.registry.names())
            .finish()
    }
}
