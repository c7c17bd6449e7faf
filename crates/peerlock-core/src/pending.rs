//! Deferred inbound requests.
//!
//! Holds at most one request per requester; a newer request from the same
//! node replaces the older one. Entries leave the set only through
//! [`PendingRequests::take_if`] (answered), [`PendingRequests::remove_from`]
//! (requester evicted) or [`PendingRequests::expire`] (requester never
//! registered), so each is answered at most once.

use std::time::{Duration, Instant};

use peerlock_proto::{NodeId, payloads::Request};

#[derive(Debug, Clone, Copy)]
struct Deferred {
    request: Request,
    received: Instant,
}

/// Outstanding requests this node has not answered yet.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    entries: Vec<Deferred>,
}

impl PendingRequests {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deferred request received at `now`.
    ///
    /// An entry from the same requester is replaced only by a request with a
    /// timestamp at least as large, so a delayed duplicate cannot resurrect
    /// an old cycle.
    pub fn defer(&mut self, request: Request, now: Instant) {
        let incoming = Deferred { request, received: now };
        match self.entries.iter_mut().find(|d| d.request.id == request.id) {
            Some(existing) if existing.request.timestamp <= request.timestamp => {
                *existing = incoming;
            },
            Some(_) => {},
            None => self.entries.push(incoming),
        }
    }

    /// Remove and return every request matching `answerable`.
    ///
    /// Uses stable compaction so the remaining entries keep arrival order.
    pub fn take_if(&mut self, mut answerable: impl FnMut(&Request) -> bool) -> Vec<Request> {
        self.take_entries(|deferred| answerable(&deferred.request))
    }

    /// Drop any request recorded from `id`.
    pub fn remove_from(&mut self, id: NodeId) -> Option<Request> {
        let index = self.entries.iter().position(|d| d.request.id == id)?;
        Some(self.entries.remove(index).request)
    }

    /// Drop requests from ids that `known` rejects once they have waited
    /// `timeout` without the requester registering.
    pub fn expire(
        &mut self,
        timeout: Duration,
        now: Instant,
        known: impl Fn(NodeId) -> bool,
    ) -> Vec<Request> {
        self.take_entries(|deferred| {
            !known(deferred.request.id)
                && now.saturating_duration_since(deferred.received) >= timeout
        })
    }

    /// True if a request from `id` is deferred.
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.iter().any(|d| d.request.id == id)
    }

    /// Number of deferred requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is deferred.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter().map(|d| &d.request)
    }

    fn take_entries(&mut self, mut matches: impl FnMut(&Deferred) -> bool) -> Vec<Request> {
        let mut taken = Vec::new();
        self.entries.retain(|deferred| {
            if matches(deferred) {
                taken.push(deferred.request);
                false
            } else {
                true
            }
        });
        taken
    }
}
