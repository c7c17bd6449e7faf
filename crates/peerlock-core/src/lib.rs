//! peerlock protocol core logic
//!
//! Pure state machine logic for peer-to-peer mutual exclusion, completely
//! decoupled from I/O. This enables deterministic testing of the ordering
//! and liveness rules without a network.
//!
//! # Architecture
//!
//! Every node runs one [`Coordinator`]. It owns the membership table, the set
//! of deferred requests, the local request state and the liveness timers.
//! Time is passed in by the caller and every operation returns declarative
//! [`NodeAction`]s (send this payload, drop that peer's channel, the state
//! changed). A runtime or test harness interprets those actions.
//!
//! Entry is decided with Lamport timestamps and node ids as tie-break: a node
//! enters the critical section only when every peer currently in its table
//! has granted its request.
//!
//! # Components
//!
//! - [`clock`]: Lamport clock used to stamp requests
//! - [`membership`]: known peers, liveness and permission flags
//! - [`pending`]: inbound requests that were deferred
//! - [`liveness`]: heartbeat and eviction timers
//! - [`coordinator`]: RELEASED/WANTED/HELD state machine
//! - [`mod@env`]: Environment abstraction (time)
//! - [`transport`]: Transport abstraction (streams)
//! - [`error`]: Coordinator error types

pub mod clock;
pub mod coordinator;
pub mod env;
pub mod error;
pub mod liveness;
pub mod membership;
pub mod pending;
pub mod transport;

pub use clock::LamportClock;
pub use coordinator::{Coordinator, NodeAction, NodeState};
pub use env::Environment;
pub use error::CoordinatorError;
pub use liveness::{LivenessConfig, LivenessMonitor};
pub use membership::{MembershipTable, PeerRecord, PeerSnapshot};
pub use peerlock_proto::{NodeId, PeerAddress, Timestamp};
pub use pending::PendingRequests;
pub use transport::Transport;
