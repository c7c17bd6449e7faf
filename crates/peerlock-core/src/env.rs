//! Environment abstraction.
//!
//! The state machines never read the clock themselves; the runtime asks the
//! environment for `now` and passes it in. Production uses tokio time, the
//! simulation harness uses virtual time.

use std::{future::Future, time::Duration, time::Instant};

/// Source of time for a node runtime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
