//! Request and response envelopes exchanged between routers and tool servers.
//!
//! Wire format:
//!
//! ```json
//! {"operation": "calculate_rewards", "parameters": {"card_id": "c1"}}
//! {"status": "success", "data": {...}}
//! {"status": "error", "error": "Unknown operation: foo"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single operation invocation. Built once per call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "operation")]
    operation_name: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(operation_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            operation_name: operation_name.into(),
            parameters,
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }
}

/// Outcome of an invocation. Exactly one of `data` / `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseEnvelope {
    Success { data: Value },
    Error { error: String },
}

impl ResponseEnvelope {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Convert into a `Result`, data on success, message on error.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Error { error } => Err(error),
        }
    }
}
