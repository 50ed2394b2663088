//! Tool Fleet Library
//!
//! A small tool-invocation protocol plus the machinery to run it as a fleet
//! of local HTTP tool servers behind one supervisor and call router.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, logging, the request/response
//!   envelopes, the tool server and its HTTP transport
//! - **domains**: business logic organized by bounded contexts
//!   - **operations**: the operation registry, parameter schemas and the
//!     built-in travel, wallet and benefits catalogs
//! - **fleet**: process supervision and call routing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolfleet::{Config, fleet::{CallRouter, Supervisor}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let supervisor = Arc::new(Supervisor::new(&config.fleet));
//!     supervisor.start_all().await?;
//!
//!     let router = CallRouter::discover(supervisor.clone(), config.fleet.router.clone()).await?;
//!     let params = serde_json::json!({ "card_id": "c1" });
//!     let benefits = router
//!         .call("get_card_benefits", params.as_object().cloned().unwrap_or_default())
//!         .await?;
//!     println!("{benefits}");
//!
//!     supervisor.stop_all().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;
pub mod fleet;

// Re-export commonly used types for convenience
pub use core::{Config, Error, Result, ToolServer};
pub use fleet::{CallRouter, FleetError, Supervisor};
