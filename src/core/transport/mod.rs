//! Transport layer for tool servers.
//!
//! Tool servers speak JSON envelopes over HTTP on loopback. The transport
//! owns the listener, the health and catalog endpoints, and graceful
//! shutdown; message processing is delegated to [`crate::core::ToolServer`].

mod config;
mod error;
pub mod http;

pub use config::{DEFAULT_PORT, HttpConfig};
pub(crate) use config::default_rpc_path;
pub use error::{TransportError, TransportResult};
pub use http::{HttpTransport, shutdown_signal};
