//! Mutual-exclusion coordinator.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as parameter (no stored Environment)
//! - Methods return the [`NodeAction`]s the driver must execute
//! - The driver owns the only `Coordinator` and feeds it every inbound
//!   payload and local intent from a single loop, so no locking is needed
//!
//! # State Machine
//!
//! ```text
//!              acquire                 all peers granted
//! ┌──────────┐ ───────> ┌────────┐ ──────────────────> ┌──────┐
//! │ RELEASED │          │ WANTED │                     │ HELD │
//! └──────────┘          └────────┘                     └──────┘
//!       ^                                                 │
//!       └──────────────────────── release ────────────────┘
//! ```
//!
//! # Ordering
//!
//! Requests are ordered by `(timestamp, id)`. An inbound request is granted
//! at once when RELEASED, when WANTED and the inbound request precedes our
//! own, and never while HELD. Everything else is deferred and re-evaluated
//! after every event; release answers the whole deferred set.
//!
//! Entry requires a grant from every peer in the table *at that moment*.
//! Evicting a silent peer therefore removes it from the requirement.
//! Grants are cleared again on entry, so they never outlive WANTED.

use std::{fmt, time::Instant};

use peerlock_proto::{
    NodeId, PeerAddress, Timestamp,
    payloads::{Heartbeat, Join, JoinAck, Payload, PeerInfo, Request, Response},
};
use tracing::{debug, info, warn};

use crate::{
    LamportClock, LivenessConfig, LivenessMonitor, MembershipTable, PendingRequests,
    PeerSnapshot, error::CoordinatorError,
};

/// Lifecycle of the local node with respect to the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not using and not asking for the resource
    Released,
    /// Request broadcast, collecting grants
    Wanted,
    /// Inside the critical section
    Held,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Released => "RELEASED",
            Self::Wanted => "WANTED",
            Self::Held => "HELD",
        };
        f.write_str(name)
    }
}

/// Effects produced by the coordinator for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Send `payload` to `address`, fire-and-forget.
    Send {
        /// Destination id, if known (seeds are dialed before their id is)
        peer: Option<NodeId>,
        /// Destination address
        address: PeerAddress,
        /// Message to send
        payload: Payload,
    },

    /// Drop any outbound channel to an evicted peer.
    Disconnect {
        /// Evicted peer
        peer: NodeId,
        /// Its last known address
        address: PeerAddress,
    },

    /// The local state changed.
    StateChanged {
        /// Previous state
        from: NodeState,
        /// New state
        to: NodeState,
    },
}

/// Per-node protocol state.
#[derive(Debug, Clone)]
pub struct Coordinator {
    id: NodeId,
    address: PeerAddress,
    state: NodeState,
    /// Timestamp broadcast for the current cycle; fixed for a whole WANTED
    /// episode and cleared on release.
    request: Option<Timestamp>,
    clock: LamportClock,
    members: MembershipTable,
    pending: PendingRequests,
    liveness: LivenessMonitor,
}

impl Coordinator {
    /// Create a RELEASED coordinator with no known peers.
    pub fn new(id: NodeId, address: PeerAddress, liveness: LivenessConfig) -> Self {
        Self {
            id,
            address,
            state: NodeState::Released,
            request: None,
            clock: LamportClock::new(),
            members: MembershipTable::new(),
            pending: PendingRequests::new(),
            liveness: LivenessMonitor::new(liveness),
        }
    }

    /// Replace the logical clock.
    pub fn with_clock(mut self, clock: LamportClock) -> Self {
        self.clock = clock;
        self
    }

    /// Local node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Timestamp of the in-flight request, if any.
    pub fn request_timestamp(&self) -> Option<Timestamp> {
        self.request
    }

    /// Membership table (read-only).
    pub fn members(&self) -> &MembershipTable {
        &self.members
    }

    /// Deferred inbound requests (read-only).
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Join every seed address other than our own.
    pub fn announce(&self, seeds: &[PeerAddress]) -> Vec<NodeAction> {
        seeds
            .iter()
            .filter(|seed| **seed != self.address)
            .map(|seed| NodeAction::Send {
                peer: None,
                address: seed.clone(),
                payload: self.join_payload(),
            })
            .collect()
    }

    /// Local intent: ask for the critical section.
    ///
    /// # Errors
    ///
    /// `AlreadyRequested` unless RELEASED; state is unchanged.
    /// `ClockExhausted` once no later timestamp exists. This is fatal.
    pub fn acquire(&mut self, _now: Instant) -> Result<Vec<NodeAction>, CoordinatorError> {
        if self.state != NodeState::Released {
            return Err(CoordinatorError::AlreadyRequested { state: self.state });
        }

        let Some(timestamp) = self.clock.tick() else {
            return Err(CoordinatorError::ClockExhausted);
        };
        self.request = Some(timestamp);
        self.members.reset_permissions();

        let mut actions = Vec::new();
        self.transition(NodeState::Wanted, &mut actions);
        info!(node = self.id, timestamp, peers = self.members.len(), "requesting critical section");

        let request = Payload::Request(Request { id: self.id, timestamp });
        for (id, record) in self.members.iter() {
            actions.push(NodeAction::Send {
                peer: Some(id),
                address: record.address.clone(),
                payload: request.clone(),
            });
        }

        self.advance(&mut actions);
        Ok(actions)
    }

    /// Local intent: leave the critical section and answer deferred requests.
    ///
    /// # Errors
    ///
    /// `NotHeld` unless HELD; state is unchanged.
    pub fn release(&mut self, _now: Instant) -> Result<Vec<NodeAction>, CoordinatorError> {
        if self.state != NodeState::Held {
            return Err(CoordinatorError::NotHeld { state: self.state });
        }

        self.request = None;
        self.members.reset_permissions();

        let mut actions = Vec::new();
        self.transition(NodeState::Released, &mut actions);
        self.advance(&mut actions);
        Ok(actions)
    }

    /// Local intent: list peers without mutating anything.
    pub fn peers(&self, now: Instant) -> Vec<PeerSnapshot> {
        self.members.snapshot(now)
    }

    /// Process one inbound payload.
    pub fn handle_payload(&mut self, payload: Payload, now: Instant) -> Vec<NodeAction> {
        if payload.sender() == self.id {
            debug!(node = self.id, opcode = ?payload.opcode(), "ignoring message from self");
            return Vec::new();
        }

        let mut actions = Vec::new();
        match payload {
            Payload::Join(join) => self.on_join(join, now, &mut actions),
            Payload::JoinAck(ack) => self.on_join_ack(ack, now, &mut actions),
            Payload::Heartbeat(heartbeat) => self.members.mark_alive(heartbeat.id, now),
            Payload::Request(request) => self.on_request(request, now),
            Payload::Response(response) => self.on_response(response, now),
        }

        self.advance(&mut actions);
        actions
    }

    /// Periodic duties: heartbeat, eviction, re-evaluation and invariant
    /// checks.
    ///
    /// # Errors
    ///
    /// `InvariantViolated` if internal state is inconsistent. This is fatal.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<NodeAction>, CoordinatorError> {
        let mut actions = Vec::new();

        if self.liveness.heartbeat_due(now) {
            let heartbeat = Payload::Heartbeat(Heartbeat { id: self.id });
            for (id, record) in self.members.iter() {
                actions.push(NodeAction::Send {
                    peer: Some(id),
                    address: record.address.clone(),
                    payload: heartbeat.clone(),
                });
            }
        }

        for (id, record) in self.members.evict_dead(self.liveness.timeout(), now) {
            warn!(node = self.id, peer = id, address = %record.address, "evicting silent peer");
            self.pending.remove_from(id);
            actions.push(NodeAction::Disconnect { peer: id, address: record.address });
        }

        let members = &self.members;
        for request in self.pending.expire(self.liveness.timeout(), now, |id| members.contains(id)) {
            warn!(node = self.id, from = request.id, "dropping request from a peer that never joined");
        }

        self.advance(&mut actions);
        self.verify()?;
        Ok(actions)
    }

    fn on_join(&mut self, join: Join, now: Instant, actions: &mut Vec<NodeAction>) {
        // Always answered, so a repeated Join still gets our peer list.
        actions.push(self.peer_list_for(join.id, join.address.clone()));
        self.register_peer(join.id, join.address, now, actions);
    }

    fn on_join_ack(&mut self, ack: JoinAck, now: Instant, actions: &mut Vec<NodeAction>) {
        if self.register_peer(ack.id, ack.address.clone(), now, actions)
            && self.members.len() > 1
        {
            actions.push(self.peer_list_for(ack.id, ack.address));
        }

        for info in ack.peers {
            if info.id == self.id || self.members.contains(info.id) {
                continue;
            }
            debug!(node = self.id, peer = info.id, address = %info.address, "joining introduced peer");
            actions.push(NodeAction::Send {
                peer: Some(info.id),
                address: info.address,
                payload: self.join_payload(),
            });
        }
    }

    fn on_request(&mut self, request: Request, now: Instant) {
        self.clock.observe(request.timestamp);
        self.members.mark_alive(request.id, now);
        debug!(node = self.id, from = request.id, timestamp = request.timestamp, "request received");

        // Answered (possibly right away) by `advance`.
        self.pending.defer(request, now);
    }

    fn on_response(&mut self, response: Response, now: Instant) {
        self.members.mark_alive(response.id, now);

        if !response.granted {
            return;
        }
        if self.state == NodeState::Wanted && self.request == Some(response.timestamp) {
            debug!(node = self.id, from = response.id, "permission granted");
            self.members.grant(response.id);
        } else {
            debug!(
                node = self.id,
                from = response.id,
                timestamp = response.timestamp,
                state = %self.state,
                "ignoring stale grant"
            );
        }
    }

    /// Register a peer.
    ///
    /// A newcomer is introduced to every existing peer, and is sent our
    /// request if we are WANTED.
    fn register_peer(
        &mut self,
        id: NodeId,
        address: PeerAddress,
        now: Instant,
        actions: &mut Vec<NodeAction>,
    ) -> bool {
        let added = self.members.add_peer(id, address.clone(), now);
        if !added {
            return false;
        }
        info!(node = self.id, peer = id, %address, "peer joined");

        let newcomer = PeerInfo { id, address: address.clone() };
        for (other, record) in self.members.iter().filter(|&(other, _)| other != id) {
            actions.push(NodeAction::Send {
                peer: Some(other),
                address: record.address.clone(),
                payload: Payload::JoinAck(JoinAck {
                    id: self.id,
                    address: self.address.clone(),
                    peers: vec![newcomer.clone()],
                }),
            });
        }

        if let (NodeState::Wanted, Some(timestamp)) = (self.state, self.request) {
            actions.push(NodeAction::Send {
                peer: Some(id),
                address,
                payload: Payload::Request(Request { id: self.id, timestamp }),
            });
        }
        true
    }

    /// JoinAck telling `to` about every peer except itself.
    fn peer_list_for(&self, to: NodeId, address: PeerAddress) -> NodeAction {
        NodeAction::Send {
            peer: Some(to),
            address,
            payload: Payload::JoinAck(JoinAck {
                id: self.id,
                address: self.address.clone(),
                peers: self.members.peer_infos(Some(to)),
            }),
        }
    }

    /// Answer whatever the current state allows, then check for entry.
    fn advance(&mut self, actions: &mut Vec<NodeAction>) {
        let state = self.state;
        let local = self.request.map(|timestamp| Request { id: self.id, timestamp });
        let members = &self.members;

        let answered = self.pending.take_if(|request| {
            members.contains(request.id)
                && match state {
                    NodeState::Released => true,
                    NodeState::Wanted => local.is_some_and(|own| request.precedes(&own)),
                    NodeState::Held => false,
                }
        });

        for request in answered {
            if let Some(record) = self.members.get(request.id) {
                debug!(node = self.id, to = request.id, timestamp = request.timestamp, "granting");
                actions.push(NodeAction::Send {
                    peer: Some(request.id),
                    address: record.address.clone(),
                    payload: Payload::Response(Response {
                        id: self.id,
                        granted: true,
                        timestamp: request.timestamp,
                    }),
                });
            }
        }

        if self.state == NodeState::Wanted && self.members.all_granted() {
            // Grants only mean something while WANTED.
            self.members.reset_permissions();
            self.transition(NodeState::Held, actions);
        }
    }

    fn transition(&mut self, to: NodeState, actions: &mut Vec<NodeAction>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(node = self.id, %from, %to, "state changed");
        actions.push(NodeAction::StateChanged { from, to });
    }

    fn verify(&self) -> Result<(), CoordinatorError> {
        match (self.state, self.request) {
            (NodeState::Released, Some(timestamp)) => Err(CoordinatorError::InvariantViolated(
                format!("RELEASED with in-flight request timestamp {timestamp}"),
            )),
            (NodeState::Released | NodeState::Held, _) if self.members.any_granted() => Err(
                CoordinatorError::InvariantViolated(format!(
                    "{} with granted permissions",
                    self.state
                )),
            ),
            (NodeState::Wanted | NodeState::Held, None) => Err(
                CoordinatorError::InvariantViolated(format!("{} without a request", self.state)),
            ),
            _ => Ok(()),
        }
    }

    fn join_payload(&self) -> Payload {
        Payload::Join(Join { id: self.id, address: self.address.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn addr(id: NodeId) -> PeerAddress {
        PeerAddress::new(format!("node-{id}"), 7000)
    }

    fn node(id: NodeId) -> Coordinator {
        Coordinator::new(id, addr(id), LivenessConfig::default())
    }

    /// Node with the given peers already registered.
    fn node_with_peers(id: NodeId, peers: &[NodeId], now: Instant) -> Coordinator {
        let mut coordinator = node(id);
        for &peer in peers {
            coordinator.members.add_peer(peer, addr(peer), now);
        }
        coordinator
    }

    fn sends(actions: &[NodeAction]) -> Vec<(Option<NodeId>, Payload)> {
        actions
            .iter()
            .filter_map(|action| match action {
                NodeAction::Send { peer, payload, .. } => Some((*peer, payload.clone())),
                _ => None,
            })
            .collect()
    }

    fn grants_to(actions: &[NodeAction], to: NodeId) -> usize {
        sends(actions)
            .into_iter()
            .filter(|(peer, payload)| {
                *peer == Some(to) && matches!(payload, Payload::Response(r) if r.granted)
            })
            .count()
    }

    #[test]
    fn acquire_without_peers_enters_immediately() {
        let t0 = Instant::now();
        let mut a = node(1);

        let actions = a.acquire(t0).unwrap();

        assert_eq!(a.state(), NodeState::Held);
        assert_eq!(
            actions,
            vec![
                NodeAction::StateChanged { from: NodeState::Released, to: NodeState::Wanted },
                NodeAction::StateChanged { from: NodeState::Wanted, to: NodeState::Held },
            ]
        );
    }

    #[test]
    fn acquire_broadcasts_request() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2, 3], t0);

        let actions = a.acquire(t0).unwrap();

        assert_eq!(a.state(), NodeState::Wanted);
        let ts = a.request_timestamp().unwrap();
        assert_eq!(
            sends(&actions),
            vec![
                (Some(2), Payload::Request(Request { id: 1, timestamp: ts })),
                (Some(3), Payload::Request(Request { id: 1, timestamp: ts })),
            ]
        );
    }

    #[test]
    fn request_timestamps_increase_across_cycles() {
        let t0 = Instant::now();
        let mut a = node(1);

        a.acquire(t0).unwrap();
        let first = a.request_timestamp().unwrap();
        a.release(t0).unwrap();
        a.acquire(t0).unwrap();

        assert!(a.request_timestamp().unwrap() > first);
    }

    #[test]
    fn scenario_a_released_peer_grants_and_requester_enters() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        let mut b = node_with_peers(2, &[1], t0);

        let request = sends(&a.acquire(t0).unwrap()).remove(0).1;
        let reply = b.handle_payload(request, t0);
        assert_eq!(grants_to(&reply, 1), 1);
        assert!(b.pending().is_empty());

        let response = sends(&reply).remove(0).1;
        a.handle_payload(response, t0);

        assert_eq!(a.state(), NodeState::Held);
        assert!(!a.members().any_granted());
    }

    #[test]
    fn scenario_b_equal_timestamps_lower_id_wins() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0).with_clock(LamportClock::starting_at(99));
        let mut b = node_with_peers(2, &[1], t0).with_clock(LamportClock::starting_at(99));

        let a_req = sends(&a.acquire(t0).unwrap()).remove(0).1;
        let b_req = sends(&b.acquire(t0).unwrap()).remove(0).1;
        assert_eq!(a.request_timestamp(), Some(100));
        assert_eq!(b.request_timestamp(), Some(100));

        // B grants A: equal timestamp, A has the lower id.
        let b_out = b.handle_payload(a_req, t0);
        assert_eq!(grants_to(&b_out, 1), 1);

        // A queues B.
        let a_out = a.handle_payload(b_req, t0);
        assert_eq!(grants_to(&a_out, 2), 0);
        assert!(a.pending().contains(2));

        a.handle_payload(sends(&b_out).remove(0).1, t0);
        assert_eq!(a.state(), NodeState::Held);
        assert_eq!(b.state(), NodeState::Wanted);

        // Release answers the deferred request and B gets in.
        let released = a.release(t0).unwrap();
        assert_eq!(grants_to(&released, 2), 1);
        assert!(a.pending().is_empty());

        let grant = sends(&released).into_iter().find(|(peer, _)| *peer == Some(2)).unwrap().1;
        b.handle_payload(grant, t0);
        assert_eq!(b.state(), NodeState::Held);
    }

    #[test]
    fn lower_timestamp_wins_regardless_of_id() {
        let t0 = Instant::now();
        let mut low_id = node_with_peers(3, &[7], t0).with_clock(LamportClock::starting_at(8));
        low_id.acquire(t0).unwrap();
        assert_eq!(low_id.request_timestamp(), Some(9));

        let out = low_id.handle_payload(Payload::Request(Request { id: 7, timestamp: 5 }), t0);
        assert_eq!(grants_to(&out, 7), 1);
    }

    #[test]
    fn held_defers_everything_until_release() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2, 3], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();
        for peer in [2, 3] {
            a.handle_payload(Payload::Response(Response { id: peer, granted: true, timestamp: ts }), t0);
        }
        assert_eq!(a.state(), NodeState::Held);

        let out = a.handle_payload(Payload::Request(Request { id: 2, timestamp: 1 }), t0);
        assert_eq!(grants_to(&out, 2), 0);
        let out = a.handle_payload(Payload::Request(Request { id: 3, timestamp: 50 }), t0);
        assert_eq!(grants_to(&out, 3), 0);
        assert_eq!(a.pending().len(), 2);

        let released = a.release(t0).unwrap();
        assert_eq!(grants_to(&released, 2), 1);
        assert_eq!(grants_to(&released, 3), 1);
        assert!(a.pending().is_empty());
        assert!(!a.members().any_granted());
    }

    #[test]
    fn invalid_intents_leave_state_unchanged() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);

        assert_eq!(
            a.release(t0),
            Err(CoordinatorError::NotHeld { state: NodeState::Released })
        );
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp();

        assert_eq!(
            a.acquire(t0),
            Err(CoordinatorError::AlreadyRequested { state: NodeState::Wanted })
        );
        assert_eq!(a.release(t0), Err(CoordinatorError::NotHeld { state: NodeState::Wanted }));
        assert_eq!(a.state(), NodeState::Wanted);
        assert_eq!(a.request_timestamp(), ts);
    }

    #[test]
    fn denial_and_stale_grants_do_not_count() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();

        a.handle_payload(Payload::Response(Response { id: 2, granted: false, timestamp: ts }), t0);
        a.handle_payload(
            Payload::Response(Response { id: 2, granted: true, timestamp: ts - 1 }),
            t0,
        );

        assert!(!a.members().get(2).unwrap().granted);
        assert_eq!(a.state(), NodeState::Wanted);
    }

    #[test]
    fn grant_while_released_is_ignored() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);

        a.handle_payload(Payload::Response(Response { id: 2, granted: true, timestamp: 0 }), t0);

        assert!(!a.members().any_granted());
        assert!(a.tick(t0).is_ok());
    }

    #[test]
    fn scenario_c_eviction_shrinks_quorum() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2, 3], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();
        a.handle_payload(Payload::Response(Response { id: 3, granted: true, timestamp: ts }), t0);
        assert_eq!(a.state(), NodeState::Wanted);

        // Peer 3 keeps heartbeating, peer 2 goes silent.
        for secs in 1..=10 {
            let now = t0 + Duration::from_secs(secs);
            a.handle_payload(Payload::Heartbeat(Heartbeat { id: 3 }), now);
            a.tick(now).unwrap();
        }

        assert!(!a.members().contains(2));
        assert!(a.members().contains(3));
        assert_eq!(a.state(), NodeState::Held);
    }

    #[test]
    fn eviction_emits_disconnect_and_drops_pending() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        a.handle_payload(Payload::Request(Request { id: 2, timestamp: 99 }), t0);
        assert!(a.pending().contains(2));

        let actions = a.tick(t0 + Duration::from_secs(10)).unwrap();

        assert!(actions.contains(&NodeAction::Disconnect { peer: 2, address: addr(2) }));
        assert!(a.pending().is_empty());
        assert_eq!(a.state(), NodeState::Held);
    }

    #[test]
    fn tick_heartbeats_each_peer_once_per_interval() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2, 3], t0);

        let first = sends(&a.tick(t0).unwrap());
        assert_eq!(
            first,
            vec![
                (Some(2), Payload::Heartbeat(Heartbeat { id: 1 })),
                (Some(3), Payload::Heartbeat(Heartbeat { id: 1 })),
            ]
        );
        assert!(sends(&a.tick(t0 + Duration::from_millis(300)).unwrap()).is_empty());
        assert_eq!(sends(&a.tick(t0 + Duration::from_secs(1)).unwrap()).len(), 2);
    }

    #[test]
    fn join_is_acknowledged_and_introduced() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);

        let actions = a.handle_payload(Payload::Join(Join { id: 3, address: addr(3) }), t0);

        assert!(a.members().contains(3));
        assert_eq!(
            sends(&actions),
            vec![
                (
                    Some(3),
                    Payload::JoinAck(JoinAck {
                        id: 1,
                        address: addr(1),
                        peers: vec![PeerInfo { id: 2, address: addr(2) }],
                    })
                ),
                (
                    Some(2),
                    Payload::JoinAck(JoinAck {
                        id: 1,
                        address: addr(1),
                        peers: vec![PeerInfo { id: 3, address: addr(3) }],
                    })
                ),
            ]
        );
    }

    #[test]
    fn repeated_join_only_acknowledges() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2, 3], t0);
        a.members.grant(3);

        let actions = a.handle_payload(Payload::Join(Join { id: 3, address: addr(3) }), t0);

        assert_eq!(sends(&actions).len(), 1);
        assert_eq!(a.members().len(), 2);
        assert!(a.members().get(3).unwrap().granted);
    }

    #[test]
    fn join_ack_registers_sender_and_joins_listed_peers() {
        let t0 = Instant::now();
        let mut c = node(3);

        let actions = c.handle_payload(
            Payload::JoinAck(JoinAck {
                id: 1,
                address: addr(1),
                peers: vec![
                    PeerInfo { id: 2, address: addr(2) },
                    PeerInfo { id: 3, address: addr(3) },
                ],
            }),
            t0,
        );

        assert!(c.members().contains(1));
        assert!(!c.members().contains(2));
        assert_eq!(
            sends(&actions),
            vec![(Some(2), Payload::Join(Join { id: 3, address: addr(3) }))]
        );
    }

    #[test]
    fn join_ack_from_new_peer_is_answered_with_our_peers() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);

        let actions = a.handle_payload(
            Payload::JoinAck(JoinAck { id: 3, address: addr(3), peers: Vec::new() }),
            t0,
        );

        assert_eq!(
            sends(&actions),
            vec![
                (
                    Some(2),
                    Payload::JoinAck(JoinAck {
                        id: 1,
                        address: addr(1),
                        peers: vec![PeerInfo { id: 3, address: addr(3) }],
                    })
                ),
                (
                    Some(3),
                    Payload::JoinAck(JoinAck {
                        id: 1,
                        address: addr(1),
                        peers: vec![PeerInfo { id: 2, address: addr(2) }],
                    })
                ),
            ]
        );
    }

    #[test]
    fn peer_joining_while_wanted_receives_request() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();

        let actions = a.handle_payload(Payload::Join(Join { id: 3, address: addr(3) }), t0);

        assert!(sends(&actions)
            .contains(&(Some(3), Payload::Request(Request { id: 1, timestamp: ts }))));
        assert!(!a.members().all_granted());
    }

    #[test]
    fn request_from_unknown_peer_waits_for_its_join() {
        let t0 = Instant::now();
        let mut a = node(1);

        let out = a.handle_payload(Payload::Request(Request { id: 4, timestamp: 3 }), t0);
        assert!(sends(&out).is_empty());
        assert!(a.pending().contains(4));

        let out = a.handle_payload(Payload::Join(Join { id: 4, address: addr(4) }), t0);
        assert_eq!(grants_to(&out, 4), 1);
        assert!(a.pending().is_empty());
    }

    #[test]
    fn request_from_peer_that_never_joins_expires() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.handle_payload(Payload::Request(Request { id: 4, timestamp: 3 }), t0);

        for secs in 1..=9 {
            let now = t0 + Duration::from_secs(secs);
            a.handle_payload(Payload::Heartbeat(Heartbeat { id: 2 }), now);
            a.tick(now).unwrap();
        }
        assert!(a.pending().contains(4));

        let now = t0 + Duration::from_secs(10);
        a.handle_payload(Payload::Heartbeat(Heartbeat { id: 2 }), now);
        a.tick(now).unwrap();
        assert!(a.pending().is_empty());
        assert!(a.members().contains(2));
    }

    #[test]
    fn inbound_request_advances_clock() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.handle_payload(Payload::Request(Request { id: 2, timestamp: 40 }), t0);

        a.acquire(t0).unwrap();
        assert_eq!(a.request_timestamp(), Some(41));
    }

    #[test]
    fn messages_from_self_are_ignored() {
        let t0 = Instant::now();
        let mut a = node(1);

        let actions = a.handle_payload(Payload::Join(Join { id: 1, address: addr(1) }), t0);
        assert!(actions.is_empty());
        assert!(a.members().is_empty());
    }

    #[test]
    fn announce_skips_own_address() {
        let a = node(1);
        let actions = a.announce(&[addr(1), addr(2)]);

        assert_eq!(
            actions,
            vec![NodeAction::Send {
                peer: None,
                address: addr(2),
                payload: Payload::Join(Join { id: 1, address: addr(1) }),
            }]
        );
    }

    #[test]
    fn peers_listing_does_not_mutate() {
        let t0 = Instant::now();
        let a = node_with_peers(1, &[2], t0);

        let listed = a.peers(t0 + Duration::from_secs(3));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].idle, Duration::from_secs(3));
        assert_eq!(a.members().get(2).unwrap().last_seen, t0);
    }

    #[test]
    fn entering_held_clears_grants() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();

        let actions =
            a.handle_payload(Payload::Response(Response { id: 2, granted: true, timestamp: ts }), t0);

        assert!(actions.contains(&NodeAction::StateChanged {
            from: NodeState::Wanted,
            to: NodeState::Held
        }));
        assert!(!a.members().any_granted());
        assert!(a.tick(t0).is_ok());
    }

    #[test]
    fn held_with_grants_is_fatal() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        a.state = NodeState::Held;
        a.members.grant(2);

        let err = a.tick(t0).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("HELD with granted permissions"));
    }

    #[test]
    fn exhausted_clock_refuses_new_cycle() {
        let t0 = Instant::now();
        let mut a = node_with_peers(1, &[2], t0);
        a.acquire(t0).unwrap();
        let ts = a.request_timestamp().unwrap();
        a.handle_payload(Payload::Response(Response { id: 2, granted: true, timestamp: ts }), t0);
        a.release(t0).unwrap();

        // A peer pushes our clock to the end of its range.
        a.handle_payload(Payload::Request(Request { id: 2, timestamp: Timestamp::MAX }), t0);

        assert_eq!(a.acquire(t0), Err(CoordinatorError::ClockExhausted));
        assert_eq!(a.state(), NodeState::Released);
        assert_eq!(a.request_timestamp(), None);

        // A late grant carrying the same timestamp admits nothing.
        a.handle_payload(
            Payload::Response(Response { id: 2, granted: true, timestamp: Timestamp::MAX }),
            t0,
        );
        assert_eq!(a.state(), NodeState::Released);
        assert!(!a.members().any_granted());
    }

    #[test]
    fn corrupted_state_is_fatal() {
        let t0 = Instant::now();
        let mut a = node(1);
        a.state = NodeState::Held;

        let err = a.tick(t0).unwrap_err();
        assert!(err.is_fatal());
    }
}
