//! Membership table.
//!
//! Tracks every known remote node with its address, the time it was last
//! heard from and whether it has granted the current request.
//!
//! Operations on unknown ids are no-ops. Messages routinely arrive from peers
//! that were just evicted, and none of them may bring the node down.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use peerlock_proto::{NodeId, PeerAddress, payloads::PeerInfo};

/// One known remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Where the peer accepts connections
    pub address: PeerAddress,
    /// True once the peer granted the current request
    pub granted: bool,
    /// Last time any message arrived from the peer
    pub last_seen: Instant,
}

/// Read-only view of a peer for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Peer id
    pub id: NodeId,
    /// Peer address
    pub address: PeerAddress,
    /// Whether the peer granted the current request
    pub granted: bool,
    /// Time since the peer was last heard from
    pub idle: Duration,
}

/// Known peers keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MembershipTable {
    peers: BTreeMap<NodeId, PeerRecord>,
}

impl MembershipTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer.
    ///
    /// Returns `true` if the peer was not known before. Re-registration
    /// refreshes the address and last-seen time but keeps the permission flag.
    pub fn add_peer(&mut self, id: NodeId, address: PeerAddress, now: Instant) -> bool {
        match self.peers.get_mut(&id) {
            Some(record) => {
                record.address = address;
                record.last_seen = now;
                false
            },
            None => {
                self.peers.insert(id, PeerRecord { address, granted: false, last_seen: now });
                true
            },
        }
    }

    /// Delete a peer, returning its record if it was known.
    pub fn remove_peer(&mut self, id: NodeId) -> Option<PeerRecord> {
        self.peers.remove(&id)
    }

    /// Record contact from `id`. Unknown ids are ignored.
    pub fn mark_alive(&mut self, id: NodeId, now: Instant) {
        if let Some(record) = self.peers.get_mut(&id) {
            record.last_seen = now;
        }
    }

    /// True iff `id` is known and was heard from less than `timeout` ago.
    pub fn is_alive(&self, id: NodeId, timeout: Duration, now: Instant) -> bool {
        self.peers
            .get(&id)
            .is_some_and(|record| now.saturating_duration_since(record.last_seen) < timeout)
    }

    /// Remove every peer that is no longer alive, returning what was removed.
    pub fn evict_dead(&mut self, timeout: Duration, now: Instant) -> Vec<(NodeId, PeerRecord)> {
        let dead: Vec<NodeId> = self
            .peers
            .keys()
            .copied()
            .filter(|&id| !self.is_alive(id, timeout, now))
            .collect();

        dead.into_iter()
            .filter_map(|id| self.peers.remove(&id).map(|record| (id, record)))
            .collect()
    }

    /// Mark `id` as having granted the current request. Unknown ids are
    /// ignored.
    pub fn grant(&mut self, id: NodeId) {
        if let Some(record) = self.peers.get_mut(&id) {
            record.granted = true;
        }
    }

    /// Clear every permission flag.
    pub fn reset_permissions(&mut self) {
        for record in self.peers.values_mut() {
            record.granted = false;
        }
    }

    /// True iff every current peer has granted. Vacuously true when empty.
    pub fn all_granted(&self) -> bool {
        self.peers.values().all(|record| record.granted)
    }

    /// True if any peer's permission flag is set.
    pub fn any_granted(&self) -> bool {
        self.peers.values().any(|record| record.granted)
    }

    /// Look up a peer.
    pub fn get(&self, id: NodeId) -> Option<&PeerRecord> {
        self.peers.get(&id)
    }

    /// True if `id` is known.
    pub fn contains(&self, id: NodeId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterate peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PeerRecord)> {
        self.peers.iter().map(|(&id, record)| (id, record))
    }

    /// Peers as advertised on the wire, excluding `except`.
    pub fn peer_infos(&self, except: Option<NodeId>) -> Vec<PeerInfo> {
        self.iter()
            .filter(|&(id, _)| Some(id) != except)
            .map(|(id, record)| PeerInfo { id, address: record.address.clone() })
            .collect()
    }

    /// Listing view at `now`.
    pub fn snapshot(&self, now: Instant) -> Vec<PeerSnapshot> {
        self.iter()
            .map(|(id, record)| PeerSnapshot {
                id,
                address: record.address.clone(),
                granted: record.granted,
                idle: now.saturating_duration_since(record.last_seen),
            })
            .collect()
    }
}
