//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use peerlock_core::{LamportClock, LivenessConfig, NodeId, NodeState};

use crate::scenario::{OracleFn, World};

/// One scripted action against the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Local acquire on a node
    Acquire(NodeId),
    /// Local release on a node
    Release(NodeId),
    /// Deliver everything in send order
    DeliverAll,
    /// Deliver everything in seeded random order
    DeliverShuffled,
    /// Let time pass on a timely network
    Advance(Duration),
    /// Stop a node for good
    Crash(NodeId),
    /// Cut traffic between two nodes
    Partition(NodeId, NodeId),
    /// Restore traffic between two nodes
    Heal(NodeId, NodeId),
    /// Fail unless a node is in the given state
    Expect(NodeId, NodeState),
}

/// Scenario builder.
///
/// Add nodes and steps, then call `.oracle()` to get a
/// [`RunnableScenario`]. Nodes are joined to each other before the first
/// step runs.
pub struct Scenario {
    name: String,
    seed: u64,
    liveness: LivenessConfig,
    nodes: Vec<(NodeId, LamportClock)>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            liveness: LivenessConfig::default(),
            nodes: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Seed for message reordering.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Liveness timing for every node.
    pub fn liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Add a node with a fresh clock.
    pub fn node(self, id: NodeId) -> Self {
        self.node_with_clock(id, LamportClock::new())
    }

    /// Add a node whose clock starts at a chosen value.
    pub fn node_with_clock(mut self, id: NodeId, clock: LamportClock) -> Self {
        self.nodes.push((id, clock));
        self
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Mutual exclusion is checked after every step regardless of the
    /// oracle; the oracle then verifies the final world.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, seed, liveness, nodes, steps } = self.scenario;

        let mut world = World::new(seed).with_liveness(liveness);
        for (id, clock) in nodes {
            world.add_node_with_clock(id, clock);
        }
        world.connect_all();
        if !world.membership_converged() {
            return Err(format!("Scenario '{name}': membership did not converge"));
        }

        for (index, step) in steps.into_iter().enumerate() {
            let result = match &step {
                Step::Acquire(id) => world.acquire(*id),
                Step::Release(id) => world.release(*id),
                Step::DeliverAll => {
                    world.deliver_all();
                    Ok(())
                },
                Step::DeliverShuffled => {
                    world.deliver_all_shuffled();
                    Ok(())
                },
                Step::Advance(duration) => world.advance(*duration),
                Step::Crash(id) => {
                    world.crash(*id);
                    Ok(())
                },
                Step::Partition(a, b) => {
                    world.partition(*a, *b);
                    Ok(())
                },
                Step::Heal(a, b) => {
                    world.heal(*a, *b);
                    Ok(())
                },
                Step::Expect(id, expected) => match world.state(*id) {
                    Some(actual) if actual == *expected => Ok(()),
                    actual => {
                        return Err(format!(
                            "Scenario '{name}': step {index}: node {id} is {actual:?}, expected {expected}"
                        ));
                    },
                },
            };

            result.map_err(|e| format!("Scenario '{name}': step {index} ({step:?}) failed: {e}"))?;

            let held = world.held_nodes();
            if held.len() > 1 {
                return Err(format!(
                    "Scenario '{name}': step {index} ({step:?}): nodes {held:?} all HELD"
                ));
            }
            if let Some(id) = world.unbacked_entries().first() {
                return Err(format!(
                    "Scenario '{name}': step {index} ({step:?}): node {id} entered without every grant"
                ));
            }
        }

        (self.oracle)(&world)
    }
}
