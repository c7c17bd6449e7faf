//! Deterministic simulation harness for peerlock protocol testing.
//!
//! Two layers:
//!
//! - [`scenario::World`] drives many [`peerlock_core::Coordinator`]s in memory
//!   with manual time, seeded message reordering, crashes and partitions.
//!   No sockets, no runtime; every run with the same seed is identical.
//! - [`SimTransport`] implements [`peerlock_core::Transport`] over turmoil's
//!   simulated TCP so real node runtimes can be exercised end to end.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_transport;

pub use scenario::{OracleFn, Scenario, Step, World};
pub use sim_transport::SimTransport;
