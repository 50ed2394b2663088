//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for tool servers:
//! error handling, configuration, logging, the request/response envelopes,
//! the tool server itself, and its HTTP transport.

pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod server;
pub mod transport;

pub use config::Config;
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use server::{HealthReport, ToolServer};
pub use transport::{HttpConfig, HttpTransport, TransportError};
