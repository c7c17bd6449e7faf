//! Tokio-backed environment.

use std::time::{Duration, Instant};

use peerlock_core::Environment;

/// Environment reading time from the tokio runtime.
///
/// Going through tokio's clock rather than `std::time` keeps paused and
/// simulated time working, so the same node code runs under turmoil.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioEnv;

impl Environment for TokioEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
