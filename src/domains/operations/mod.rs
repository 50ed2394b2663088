//! Operations domain module.
//!
//! Operations are the named, schema-validated callables a tool server exposes.
//! Each operation's parameter schema is derived from its params struct with
//! `schemars` and enforced by the registry with `jsonschema`.
//!
//! ## Architecture
//!
//! - `handlers.rs` - The handler contract and the `Operation` type
//! - `registry.rs` - Per-server registration and dispatch
//! - `definitions/` - The operations each built-in server hosts
//! - `error.rs` - Operation-specific error types
//!
//! ## Adding a New Operation
//!
//! 1. Define a params struct deriving `Deserialize` and `JsonSchema`, an
//!    `execute()` and an `OperationHandler` impl in the server's file under
//!    `definitions/`
//! 2. Add its `operation()` to that file's `operations()` list

pub mod definitions;
mod error;
mod handlers;
mod registry;

pub use error::{HandlerError, OperationError};
pub use handlers::{
    HandlerResult, Operation, OperationDescriptor, OperationHandler, Parameters, parse_params,
};
pub use registry::OperationRegistry;
