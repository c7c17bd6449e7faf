//! Node configuration.

use std::time::Duration;

use peerlock_core::{LivenessConfig, NodeId, PeerAddress};

/// Everything a node needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Unique id of this node
    pub id: NodeId,
    /// Address peers use to reach this node
    pub advertise: PeerAddress,
    /// Addresses joined on startup
    pub seeds: Vec<PeerAddress>,
    /// Heartbeat and eviction timing
    pub liveness: LivenessConfig,
    /// Pause between control loop iterations
    pub poll_interval: Duration,
    /// Queued events handled per iteration
    pub max_batch: usize,
}

impl NodeConfig {
    /// Default pause between control loop iterations.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Default number of events handled per iteration.
    pub const DEFAULT_MAX_BATCH: usize = 64;

    /// Config with default timing and no seeds.
    pub fn new(id: NodeId, advertise: PeerAddress) -> Self {
        Self {
            id,
            advertise,
            seeds: Vec::new(),
            liveness: LivenessConfig::default(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_batch: Self::DEFAULT_MAX_BATCH,
        }
    }

    /// Add seed addresses.
    pub fn with_seeds(mut self, seeds: impl IntoIterator<Item = PeerAddress>) -> Self {
        self.seeds.extend(seeds);
        self
    }

    /// Override liveness timing.
    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
