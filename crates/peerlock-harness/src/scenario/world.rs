//! World state for scenario execution.
//!
//! The World owns every simulated node, the network between them and the
//! clock. Messages are queued in flight and delivered only when the test says
//! so, either in send order or in a seeded random order. Time only moves
//! through [`World::advance`], which models a timely network: every
//! heartbeat interval all live nodes tick and everything in flight is
//! delivered before the next interval.
//!
//! Every grant handed to a node is recorded. When a node reports entering
//! HELD, the World checks that each peer in its table at that moment granted
//! the request being served; entries that fail are kept as violations.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    time::{Duration, Instant},
};

use peerlock_core::{
    Coordinator, CoordinatorError, LamportClock, LivenessConfig, NodeAction, NodeId, NodeState,
    PeerAddress, Timestamp,
};
use peerlock_proto::{Payload, payloads::Response};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Upper bound on deliveries in one [`World::deliver_all`] call.
const DELIVERY_LIMIT: usize = 100_000;

/// A message between two simulated nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender
    pub from: NodeId,
    /// Receiver
    pub to: NodeId,
    /// Message
    pub payload: Payload,
}

#[derive(Debug)]
struct SimNode {
    coordinator: Coordinator,
    crashed: bool,
}

/// World state containing all nodes, the network and metrics.
pub struct World {
    nodes: BTreeMap<NodeId, SimNode>,
    addresses: HashMap<PeerAddress, NodeId>,
    in_flight: VecDeque<Envelope>,
    partitions: BTreeSet<(NodeId, NodeId)>,
    liveness: LivenessConfig,
    rng: ChaCha8Rng,
    start: Instant,
    now: Instant,
    delivered: usize,
    dropped: usize,
    max_held: usize,
    /// (receiver, granter, request timestamp) for every grant delivered
    grants: BTreeSet<(NodeId, NodeId, Timestamp)>,
    unbacked_entries: Vec<NodeId>,
}

impl World {
    /// Empty world with default liveness timing.
    pub fn new(seed: u64) -> Self {
        let now = Instant::now();
        Self {
            nodes: BTreeMap::new(),
            addresses: HashMap::new(),
            in_flight: VecDeque::new(),
            partitions: BTreeSet::new(),
            liveness: LivenessConfig::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            start: now,
            now,
            delivered: 0,
            dropped: 0,
            max_held: 0,
            grants: BTreeSet::new(),
            unbacked_entries: Vec::new(),
        }
    }

    /// Override the liveness timing of nodes added afterwards.
    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Address a simulated node advertises.
    pub fn address_of(id: NodeId) -> PeerAddress {
        PeerAddress::new(format!("node-{id}"), 7000)
    }

    /// Add a node that knows nobody.
    pub fn add_node(&mut self, id: NodeId) {
        self.add_node_with_clock(id, LamportClock::new());
    }

    /// Add a node whose clock starts at a chosen value.
    pub fn add_node_with_clock(&mut self, id: NodeId, clock: LamportClock) {
        let address = Self::address_of(id);
        let coordinator =
            Coordinator::new(id, address.clone(), self.liveness).with_clock(clock);
        self.addresses.insert(address, id);
        self.nodes.insert(id, SimNode { coordinator, crashed: false });
    }

    /// Have `id` join the given seed nodes. Messages stay in flight.
    pub fn join(&mut self, id: NodeId, seeds: &[NodeId]) {
        let seeds: Vec<PeerAddress> = seeds.iter().map(|&seed| Self::address_of(seed)).collect();
        if let Some(node) = self.live(id) {
            let actions = node.coordinator.announce(&seeds);
            self.apply(id, actions);
        }
    }

    /// Join every node through the lowest id and deliver until quiet.
    pub fn connect_all(&mut self) {
        let ids = self.node_ids();
        if let Some((&first, rest)) = ids.split_first() {
            for &id in rest {
                self.join(id, &[first]);
            }
        }
        self.deliver_all();
    }

    /// Local intent on `id`.
    pub fn acquire(&mut self, id: NodeId) -> Result<(), CoordinatorError> {
        let now = self.now;
        let Some(node) = self.live(id) else {
            return Ok(());
        };
        let actions = node.coordinator.acquire(now)?;
        self.apply(id, actions);
        Ok(())
    }

    /// Local intent on `id`.
    pub fn release(&mut self, id: NodeId) -> Result<(), CoordinatorError> {
        let now = self.now;
        let Some(node) = self.live(id) else {
            return Ok(());
        };
        let actions = node.coordinator.release(now)?;
        self.apply(id, actions);
        Ok(())
    }

    /// Run one tick on every live node at the current time.
    pub fn tick_all(&mut self) -> Result<(), CoordinatorError> {
        let now = self.now;
        for id in self.node_ids() {
            if let Some(node) = self.live(id) {
                let actions = node.coordinator.tick(now)?;
                self.apply(id, actions);
            }
        }
        Ok(())
    }

    /// Let `duration` pass on a timely network.
    ///
    /// Time moves in heartbeat-sized steps; each step ticks every live node
    /// and then delivers everything in flight.
    pub fn advance(&mut self, duration: Duration) -> Result<(), CoordinatorError> {
        let step = self.liveness.heartbeat_interval.max(Duration::from_millis(1));
        let mut remaining = duration;
        while !remaining.is_zero() {
            let delta = remaining.min(step);
            self.now += delta;
            remaining -= delta;
            self.tick_all()?;
            self.deliver_all();
        }
        Ok(())
    }

    /// Deliver the oldest message in flight. Returns false when none is left.
    pub fn deliver_next(&mut self) -> bool {
        match self.in_flight.pop_front() {
            Some(envelope) => {
                self.deliver(envelope);
                true
            },
            None => false,
        }
    }

    /// Deliver a randomly chosen message in flight (seeded reordering).
    pub fn deliver_random(&mut self) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        let index = self.rng.gen_range(0..self.in_flight.len());
        match self.in_flight.remove(index) {
            Some(envelope) => {
                self.deliver(envelope);
                true
            },
            None => false,
        }
    }

    /// Deliver in send order until nothing is in flight.
    pub fn deliver_all(&mut self) -> usize {
        let mut count = 0;
        while count < DELIVERY_LIMIT && self.deliver_next() {
            count += 1;
        }
        count
    }

    /// Deliver in seeded random order until nothing is in flight.
    pub fn deliver_all_shuffled(&mut self) -> usize {
        let mut count = 0;
        while count < DELIVERY_LIMIT && self.deliver_random() {
            count += 1;
        }
        count
    }

    /// Stop a node for good. Messages to it are dropped from now on.
    pub fn crash(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.crashed = true;
        }
    }

    /// Drop all traffic between `a` and `b` until healed.
    pub fn partition(&mut self, a: NodeId, b: NodeId) {
        self.partitions.insert(ordered(a, b));
    }

    /// Restore traffic between `a` and `b`.
    pub fn heal(&mut self, a: NodeId, b: NodeId) {
        self.partitions.remove(&ordered(a, b));
    }

    /// Coordinator of `id`, crashed or not.
    pub fn coordinator(&self, id: NodeId) -> Option<&Coordinator> {
        self.nodes.get(&id).map(|node| &node.coordinator)
    }

    /// State of `id`.
    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.coordinator(id).map(Coordinator::state)
    }

    /// True if `id` was crashed.
    pub fn is_crashed(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.crashed)
    }

    /// Every node id in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Live nodes currently HELD.
    pub fn held_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.crashed && node.coordinator.state() == NodeState::Held)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Most live nodes ever observed HELD at once.
    pub fn max_held_observed(&self) -> usize {
        self.max_held
    }

    /// Nodes that entered HELD without a grant from every peer they listed,
    /// one entry per offending transition.
    pub fn unbacked_entries(&self) -> &[NodeId] {
        &self.unbacked_entries
    }

    /// Messages waiting for delivery.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Messages delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Messages dropped so far (crash, partition or unknown address).
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Simulated time since the world was created.
    pub fn elapsed(&self) -> Duration {
        self.now - self.start
    }

    /// True iff every live node lists every other live node.
    pub fn membership_converged(&self) -> bool {
        let live: Vec<NodeId> =
            self.nodes.iter().filter(|(_, node)| !node.crashed).map(|(&id, _)| id).collect();

        live.iter().all(|&id| {
            self.coordinator(id).is_some_and(|coordinator| {
                live.iter().filter(|&&other| other != id).all(|&other| {
                    coordinator.members().contains(other)
                })
            })
        })
    }

    fn live(&mut self, id: NodeId) -> Option<&mut SimNode> {
        self.nodes.get_mut(&id).filter(|node| !node.crashed)
    }

    fn deliver(&mut self, envelope: Envelope) {
        if self.partitions.contains(&ordered(envelope.from, envelope.to)) {
            trace!(from = envelope.from, to = envelope.to, "dropped by partition");
            self.dropped += 1;
            return;
        }

        let now = self.now;
        let Some(node) = self.nodes.get_mut(&envelope.to).filter(|node| !node.crashed) else {
            self.dropped += 1;
            return;
        };

        trace!(from = envelope.from, to = envelope.to, opcode = ?envelope.payload.opcode(), "deliver");
        if let Payload::Response(Response { id, granted: true, timestamp }) = envelope.payload {
            self.grants.insert((envelope.to, id, timestamp));
        }
        let actions = node.coordinator.handle_payload(envelope.payload, now);
        self.delivered += 1;
        self.apply(envelope.to, actions);
    }

    fn apply(&mut self, from: NodeId, actions: Vec<NodeAction>) {
        for action in actions {
            match action {
                NodeAction::Send { address, payload, .. } => match self.addresses.get(&address) {
                    Some(&to) => self.in_flight.push_back(Envelope { from, to, payload }),
                    None => self.dropped += 1,
                },
                NodeAction::StateChanged { to, .. } => {
                    if to == NodeState::Held && !self.entry_backed(from) {
                        self.unbacked_entries.push(from);
                    }
                    self.max_held = self.max_held.max(self.held_nodes().len());
                },
                NodeAction::Disconnect { .. } => {},
            }
        }
    }
}

impl World {
    /// True iff every peer `id` lists has granted its current request.
    fn entry_backed(&self, id: NodeId) -> bool {
        let Some(coordinator) = self.coordinator(id) else {
            return false;
        };
        let Some(timestamp) = coordinator.request_timestamp() else {
            return false;
        };
        coordinator
            .members()
            .iter()
            .all(|(peer, _)| self.grants.contains(&(id, peer, timestamp)))
    }
}

fn ordered(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}
