//! # stake-core
//!
//! The coordination kernel for claiming uniquely-assignable resources.
//! Provides renewable, TTL-bound leases with a single live holder per
//! resource, atomic promotion of a lease into a permanent assignment, and
//! per-caller status projection over pluggable storage.

pub mod api;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod state;
pub mod types;

#[cfg(test)]
mod conflict_test;
#[cfg(test)]
mod types_test;
