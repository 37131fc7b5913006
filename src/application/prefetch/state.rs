//! Prefetch queue internal state.
//!
//! Everything here is guarded by the queue's mutex. Task handles are stored
//! so that `stop` and `pop` can abort the work they own.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::ad::LoadedAd;
use crate::domain::id::LoadId;

/// Lifecycle of a prefetch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Stopped,
    /// Started, waiting for the engine to become ready.
    Paused,
    Running,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

/// A loaded ad waiting to be popped.
pub(super) struct QueuedAd {
    pub(super) id: u64,
    pub(super) ad: LoadedAd,
    pub(super) enqueued_at: Instant,
    /// TTL timer; aborted when the entry leaves the queue another way.
    pub(super) expiry: JoinHandle<()>,
}

impl QueuedAd {
    pub(super) fn is_expired(&self, ttl: Duration) -> bool {
        self.enqueued_at.elapsed() >= ttl
    }
}

pub(super) struct QueueState {
    pub(super) status: QueueStatus,
    pub(super) capacity: usize,
    pub(super) entries: VecDeque<QueuedAd>,
    /// The single in-flight fetch, if any.
    pub(super) in_flight: Option<JoinHandle<()>>,
    /// Backoff timer or readiness waiter; blocks new fetches while set.
    pub(super) scheduled: Option<JoinHandle<()>>,
    /// Bumped on every start/stop so stale tasks can tell they lost.
    pub(super) generation: u64,
    next_entry_id: u64,
}

impl QueueState {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            status: QueueStatus::Stopped,
            capacity,
            entries: VecDeque::new(),
            in_flight: None,
            scheduled: None,
            generation: 0,
            next_entry_id: 0,
        }
    }

    pub(super) fn next_entry_id(&mut self) -> u64 {
        self.next_entry_id += 1;
        self.next_entry_id
    }

    /// Whether a new fetch may be started now.
    pub(super) fn wants_fetch(&self) -> bool {
        self.status == QueueStatus::Running
            && self.in_flight.is_none()
            && self.scheduled.is_none()
            && self.entries.len() < self.capacity
    }

    /// Abort the fetch and any scheduled work.
    pub(super) fn abort_tasks(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        if let Some(handle) = self.scheduled.take() {
            handle.abort();
        }
    }

    /// Remove an entry by id.
    pub(super) fn remove(&mut self, id: u64) -> Option<QueuedAd> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    /// Remove the entry holding `load_id`.
    pub(super) fn remove_load(&mut self, load_id: &LoadId) -> Option<QueuedAd> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.ad.load_id == *load_id)?;
        self.entries.remove(index)
    }
}
