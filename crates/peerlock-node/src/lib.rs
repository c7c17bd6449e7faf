//! peerlock node runtime
//!
//! Hosts one [`peerlock_core::Coordinator`] behind a single-owner async
//! control loop. Reader tasks decode inbound frames and local intents arrive
//! through a [`NodeHandle`]; both land on one mpsc queue that only the loop
//! drains. Actions the coordinator returns are executed here: frames go out
//! through per-peer writer tasks and state changes are published on a watch
//! channel.
//!
//! The loop is generic over [`peerlock_core::Transport`] and
//! [`peerlock_core::Environment`]; production uses [`TcpTransport`] and
//! [`TokioEnv`], simulation swaps in turmoil's network.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod outbound;
pub mod prompt;
pub mod runtime;
pub mod transport;

pub use config::NodeConfig;
pub use env::TokioEnv;
pub use error::NodeError;
pub use runtime::{Node, NodeEvent, NodeHandle};
pub use transport::TcpTransport;
