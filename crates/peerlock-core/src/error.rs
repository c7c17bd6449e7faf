//! Coordinator error types.

use thiserror::Error;

use crate::NodeState;

/// Errors returned by the coordinator.
///
/// Rejected intents leave the state untouched and are reported back to the
/// user. Invariant violations mean the protocol state is corrupt and the
/// control loop must stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// `acquire` while a request is already in flight or the section is held
    #[error("cannot acquire: node is {state}")]
    AlreadyRequested {
        /// State at the time of the intent
        state: NodeState,
    },

    /// `release` while not holding the critical section
    #[error("cannot release: node is {state}, not HELD")]
    NotHeld {
        /// State at the time of the intent
        state: NodeState,
    },

    /// The logical clock has no timestamp left above the last one seen
    #[error("logical clock exhausted")]
    ClockExhausted,

    /// Internal bookkeeping contradicts the state machine
    #[error("protocol invariant violated: {0}")]
    InvariantViolated(String),
}

impl CoordinatorError {
    /// True if the control loop must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ClockExhausted | Self::InvariantViolated(_))
    }
}
