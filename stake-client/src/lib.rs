//! # stake-client
//!
//! Claimant side of the stake lease protocol: an explicit holder state
//! machine, a transport trait with HTTP and in-process implementations, and
//! a tokio heartbeat driver that keeps a selected lease alive until it is
//! committed or released.

pub mod driver;
pub mod error;
pub mod machine;
pub mod transport;

pub use driver::HeartbeatDriver;
pub use error::ClientError;
pub use machine::{HolderMachine, HolderState};
pub use transport::{CoordinatorApi, HttpLeaseApi, LeaseApi};

#[cfg(test)]
mod driver_test;
