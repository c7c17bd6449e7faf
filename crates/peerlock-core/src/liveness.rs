//! Liveness timers.
//!
//! The monitor only decides *when* to heartbeat and *how long* silence is
//! tolerated; the coordinator owns the peer table the decisions apply to.

use std::time::{Duration, Instant};

/// Heartbeat and eviction timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// How often a heartbeat is broadcast
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is evicted (should be several heartbeats)
    pub timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { heartbeat_interval: Duration::from_secs(1), timeout: Duration::from_secs(10) }
    }
}

/// Heartbeat scheduler.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    config: LivenessConfig,
    last_heartbeat: Option<Instant>,
}

impl LivenessMonitor {
    /// Monitor that has not sent a heartbeat yet.
    pub fn new(config: LivenessConfig) -> Self {
        Self { config, last_heartbeat: None }
    }

    /// Eviction window.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// True if a heartbeat is due at `now`; records it as sent.
    pub fn heartbeat_due(&mut self, now: Instant) -> bool {
        let due = match self.last_heartbeat {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.heartbeat_interval,
        };
        if due {
            self.last_heartbeat = Some(now);
        }
        due
    }
}
