//! Lamport clock for request timestamps.

use peerlock_proto::Timestamp;

/// Logical clock.
///
/// `tick` is strictly increasing across calls. `observe` folds in timestamps
/// seen on inbound requests so that a node which requests after seeing
/// another node's request stamps a later value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Clock starting at zero; the first tick returns 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock whose next tick returns `value + 1`.
    pub fn starting_at(value: Timestamp) -> Self {
        Self { value }
    }

    /// Advance and return a fresh timestamp, or `None` once the range is
    /// used up. The clock is left unchanged in that case.
    pub fn tick(&mut self) -> Option<Timestamp> {
        self.value = self.value.checked_add(1)?;
        Some(self.value)
    }

    /// Raise the clock to at least `seen`.
    pub fn observe(&mut self, seen: Timestamp) {
        self.value = self.value.max(seen);
    }
}
