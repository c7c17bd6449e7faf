//! Scenario testing with mandatory oracles.

mod builder;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use world::{Envelope, World};

/// Verification run against the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
