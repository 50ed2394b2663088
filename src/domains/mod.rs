//! Domains module containing business logic organized by bounded contexts.
//!
//! Tool servers only know about operations: a registry of named handlers
//! with parameter schemas, and the built-in catalogs each server id serves.

pub mod operations;
