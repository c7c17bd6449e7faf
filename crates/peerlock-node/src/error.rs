//! Node runtime errors.

use std::io;

use peerlock_core::CoordinatorError;
use peerlock_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the node runtime and its handle.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Socket or stdio failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed frame on a connection
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The coordinator refused a local intent
    #[error("{0}")]
    Rejected(CoordinatorError),

    /// The coordinator cannot continue safely; the control loop stopped
    #[error("fatal: {0}")]
    Fatal(CoordinatorError),

    /// The control loop is gone
    #[error("node is not running")]
    QueueClosed,
}

impl From<CoordinatorError> for NodeError {
    fn from(err: CoordinatorError) -> Self {
        if err.is_fatal() { Self::Fatal(err) } else { Self::Rejected(err) }
    }
}
