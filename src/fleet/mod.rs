//! Fleet orchestration: supervising tool server processes and routing calls to them.
//!
//! - [`config`]: which servers make up the fleet, plus supervision and routing policy
//! - [`supervisor`]: process lifecycle (launch, health, drain, stop)
//! - [`router`]: operation name to server, with timeouts and retries
//! - [`health`]: the HTTP health checker shared by both

pub mod config;
pub mod error;
pub mod health;
pub mod router;
pub mod supervisor;

pub use config::{FleetConfig, RouterSettings, ServerDescriptor, SupervisorSettings};
pub use error::FleetError;
pub use health::HealthChecker;
pub use router::{AddressResolver, CallRouter, Catalog, Route, RoutingTable};
pub use supervisor::{CallLease, ServerSnapshot, ServerState, Supervisor};
