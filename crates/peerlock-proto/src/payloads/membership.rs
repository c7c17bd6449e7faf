//! Membership and liveness payloads.

use serde::{Deserialize, Serialize};

use crate::{NodeId, PeerAddress};

/// A node's identity as advertised on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Node id
    pub id: NodeId,
    /// Where the node accepts connections
    pub address: PeerAddress,
}

/// Announce a node to an existing peer.
///
/// # Protocol Flow
///
/// 1. A starting node sends Join to every seed address it was configured with
/// 2. The receiver registers the sender and answers with a [`JoinAck`]
/// 3. The receiver introduces the newcomer to its other peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Joining node id
    pub id: NodeId,
    /// Joining node's listen address
    pub address: PeerAddress,
}

/// Reciprocal registration.
///
/// The receiver registers the sender, then sends a [`Join`] to every listed
/// peer it does not know yet. This is how membership converges to a
/// symmetric full mesh without a naming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// Acknowledging node id
    pub id: NodeId,
    /// Acknowledging node's listen address
    pub address: PeerAddress,
    /// Peers known to the acknowledging node
    pub peers: Vec<PeerInfo>,
}

/// Periodic liveness ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Sending node id
    pub id: NodeId,
}
