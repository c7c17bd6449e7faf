//! Mutual-exclusion payloads.

use serde::{Deserialize, Serialize};

use crate::{NodeId, Timestamp};

/// Request for the critical section.
///
/// Requests are totally ordered by `(timestamp, id)`; the lower pair wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Requesting node id
    pub id: NodeId,
    /// Logical timestamp stamped when the request cycle started
    pub timestamp: Timestamp,
}

impl Request {
    /// True if this request must be served before `other`.
    pub fn precedes(&self, other: &Self) -> bool {
        (self.timestamp, self.id) < (other.timestamp, other.id)
    }
}

/// Answer to a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Answering node id
    pub id: NodeId,
    /// Whether permission is granted
    pub granted: bool,
    /// Timestamp of the request being answered
    pub timestamp: Timestamp,
}
