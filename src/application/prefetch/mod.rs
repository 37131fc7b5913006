//! Per-placement prefetch queues.
//!
//! A [`PrefetchQueue`] keeps up to `capacity` loaded ads warm for one
//! placement so a show request never waits on an auction.
//!
//! # Scheduling
//!
//! Fetching is single-flight: a new auction starts only when the queue is
//! below capacity, running, and has neither a fetch in flight nor a backoff
//! pending. Every way an entry leaves the queue (pop, invalidate or TTL
//! expiry) asks for one replacement. A failed fetch parks the queue for
//! [`AdLoader::retry_delay`] before trying again.
//!
//! ```text
//! Stopped --start (ready)--> Running
//! Stopped --start (not ready)--> Paused --ready--> Running
//! Running/Paused --stop--> Stopped   (entries kept)
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::ad::{LoadedAd, PlacementRequest};
use crate::domain::format::{AdFormat, AdSize};
use crate::domain::id::{LoadId, PlacementId};
use crate::error::MediationError;

mod state;

pub use state::QueueStatus;
use state::{QueueState, QueuedAd};

/// Source of ads for a prefetch queue.
#[async_trait]
pub trait AdLoader: Send + Sync {
    /// Run one auction for `request`.
    async fn load(&self, request: PlacementRequest) -> Result<LoadedAd, MediationError>;

    /// Release an ad that will never be shown.
    async fn discard(&self, ad: LoadedAd);

    /// Delay before retrying after a failed load of `request`.
    fn retry_delay(&self, request: &PlacementRequest) -> Duration;
}

/// Sizing and freshness of prefetch queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub capacity: usize,
    /// Upper bound imposed by the server on `capacity`.
    pub server_max_capacity: usize,
    /// Lifetime of a queued ad.
    pub ttl: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            server_max_capacity: 3,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl PrefetchConfig {
    /// Clamp a requested capacity to `[1, server_max_capacity]`.
    pub fn clamp_capacity(&self, capacity: usize) -> usize {
        capacity.clamp(1, self.server_max_capacity.max(1))
    }
}

struct Inner {
    template: PlacementRequest,
    loader: Arc<dyn AdLoader>,
    ready: watch::Receiver<bool>,
    config: PrefetchConfig,
    state: Mutex<QueueState>,
}

/// Bounded pool of pre-loaded ads for one placement.
///
/// Methods spawn tasks and must be called from within a Tokio runtime.
pub struct PrefetchQueue {
    inner: Arc<Inner>,
}

impl PrefetchQueue {
    /// Create a stopped queue.
    ///
    /// `ready` gates fetching: a queue started before it turns `true` stays
    /// paused until it does.
    pub fn new(
        template: PlacementRequest,
        loader: Arc<dyn AdLoader>,
        ready: watch::Receiver<bool>,
        config: PrefetchConfig,
    ) -> Self {
        let capacity = config.clamp_capacity(config.capacity);
        Self {
            inner: Arc::new(Inner {
                template,
                loader,
                ready,
                config,
                state: Mutex::new(QueueState::new(capacity)),
            }),
        }
    }

    pub fn placement(&self) -> &PlacementId {
        &self.inner.template.placement
    }

    pub fn status(&self) -> QueueStatus {
        self.inner.state.lock().status
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Number of queued entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change capacity, clamped to `[1, server_max_capacity]`.
    ///
    /// Lowering it never evicts entries. Returns the applied value.
    pub fn set_capacity(&self, capacity: usize) -> usize {
        let applied = self.inner.config.clamp_capacity(capacity);
        self.inner.state.lock().capacity = applied;
        debug!(placement = %self.placement(), capacity = applied, "Prefetch capacity set");
        maybe_fetch(&self.inner);
        applied
    }

    /// Start filling the queue. No-op unless stopped.
    pub fn start(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.status != QueueStatus::Stopped {
                return;
            }
            state.generation += 1;

            if !*inner.ready.borrow() {
                state.status = QueueStatus::Paused;
                let generation = state.generation;
                let task = Arc::clone(inner);
                let mut ready = inner.ready.clone();
                state.scheduled = Some(tokio::spawn(async move {
                    if ready.wait_for(|ready| *ready).await.is_err() {
                        warn!(
                            placement = %task.template.placement,
                            "Readiness signal dropped, prefetch stays paused"
                        );
                        return;
                    }
                    {
                        let mut state = task.state.lock();
                        if state.generation != generation {
                            return;
                        }
                        state.status = QueueStatus::Running;
                        state.scheduled = None;
                    }
                    info!(placement = %task.template.placement, "Prefetch resumed");
                    maybe_fetch(&task);
                }));
                info!(placement = %inner.template.placement, "Prefetch paused until ready");
                return;
            }

            state.status = QueueStatus::Running;
        }
        info!(placement = %inner.template.placement, "Prefetch started");
        maybe_fetch(inner);
    }

    /// Stop scheduling and cancel the in-flight fetch.
    ///
    /// Queued entries stay available until popped or expired.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.status == QueueStatus::Stopped {
            return;
        }
        state.status = QueueStatus::Stopped;
        state.generation += 1;
        state.abort_tasks();
        info!(
            placement = %self.inner.template.placement,
            queued = state.entries.len(),
            "Prefetch stopped"
        );
    }

    /// Take the oldest live entry and ask for a replacement.
    pub fn pop(&self) -> Option<LoadedAd> {
        let ttl = self.inner.config.ttl;
        let (popped, expired) = {
            let mut state = self.inner.state.lock();
            let mut expired = Vec::new();
            let mut popped = None;
            while let Some(entry) = state.entries.pop_front() {
                entry.expiry.abort();
                if entry.is_expired(ttl) {
                    expired.push(entry.ad);
                    continue;
                }
                popped = Some(entry.ad);
                break;
            }
            (popped, expired)
        };

        for ad in expired {
            let loader = Arc::clone(&self.inner.loader);
            tokio::spawn(async move { loader.discard(ad).await });
        }

        if let Some(ad) = &popped {
            debug!(placement = %self.placement(), load_id = %ad.load_id, "Prefetched ad popped");
        }
        maybe_fetch(&self.inner);
        popped
    }

    /// Drop the entry holding `load_id`, release it and ask for a replacement.
    ///
    /// Returns `false` when no queued entry has that id.
    pub fn invalidate(&self, load_id: &LoadId) -> bool {
        let removed = self.inner.state.lock().remove_load(load_id);
        let Some(entry) = removed else {
            return false;
        };
        entry.expiry.abort();
        info!(placement = %self.placement(), load_id = %load_id, "Prefetched ad invalidated");

        maybe_fetch(&self.inner);
        let loader = Arc::clone(&self.inner.loader);
        tokio::spawn(async move { loader.discard(entry.ad).await });
        true
    }

    /// The entry `pop` would return, left in place.
    pub fn peek(&self) -> Option<LoadedAd> {
        let ttl = self.inner.config.ttl;
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .find(|entry| !entry.is_expired(ttl))
            .map(|entry| entry.ad.clone())
    }
}

impl Drop for PrefetchQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn maybe_fetch(inner: &Arc<Inner>) {
    let mut state = inner.state.lock();
    if !state.wants_fetch() {
        return;
    }
    let generation = state.generation;
    let task = Arc::clone(inner);
    state.in_flight = Some(tokio::spawn(fetch(task, generation)));
}

async fn fetch(inner: Arc<Inner>, generation: u64) {
    let request = inner.template.renewed();
    let placement = request.placement.clone();
    debug!(placement = %placement, load_id = %request.load_id, "Prefetch fetch started");

    let outcome = match AssertUnwindSafe(inner.loader.load(request.clone()))
        .catch_unwind()
        .await
    {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("loader panicked".to_string()),
    };

    let stale = {
        let mut state = inner.state.lock();
        if state.generation != generation {
            outcome.ok()
        } else {
            state.in_flight = None;
            match outcome {
                Ok(ad) => {
                    let id = state.next_entry_id();
                    let expiry = tokio::spawn(expire(Arc::clone(&inner), id));
                    state.entries.push_back(QueuedAd {
                        id,
                        ad,
                        enqueued_at: Instant::now(),
                        expiry,
                    });
                    info!(
                        placement = %placement,
                        queued = state.entries.len(),
                        capacity = state.capacity,
                        "Prefetched ad queued"
                    );
                }
                Err(reason) => {
                    let delay = inner.loader.retry_delay(&request);
                    warn!(
                        placement = %placement,
                        error = %reason,
                        retry_in = ?delay,
                        "Prefetch failed, backing off"
                    );
                    let task = Arc::clone(&inner);
                    state.scheduled = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        resume(&task, generation);
                    }));
                }
            }
            None
        }
    };

    maybe_fetch(&inner);

    if let Some(ad) = stale {
        debug!(placement = %placement, "Discarding ad from a cancelled fetch");
        inner.loader.discard(ad).await;
    }
}

fn resume(inner: &Arc<Inner>, generation: u64) {
    {
        let mut state = inner.state.lock();
        if state.generation != generation {
            return;
        }
        state.scheduled = None;
    }
    maybe_fetch(inner);
}

async fn expire(inner: Arc<Inner>, id: u64) {
    tokio::time::sleep(inner.config.ttl).await;
    let entry = inner.state.lock().remove(id);
    if let Some(entry) = entry {
        info!(
            placement = %inner.template.placement,
            load_id = %entry.ad.load_id,
            "Prefetched ad expired"
        );
        maybe_fetch(&inner);
        inner.loader.discard(entry.ad).await;
    }
}

type QueueMap = DashMap<PlacementId, Arc<PrefetchQueue>>;

/// Shared view of the queues of a [`PrefetchQueues`].
///
/// Can be handed out before the queues exist, e.g. to a partner listener
/// wired into the loader the queues will use.
#[derive(Clone, Default)]
pub struct PrefetchIndex {
    queues: Arc<QueueMap>,
}

impl PrefetchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate `load_id` in whichever queue holds it.
    pub fn invalidate(&self, load_id: &LoadId) -> bool {
        let queues: Vec<_> = self
            .queues
            .iter()
            .map(|queue| Arc::clone(queue.value()))
            .collect();
        queues.iter().any(|queue| queue.invalidate(load_id))
    }
}

/// Prefetch queues keyed by placement.
pub struct PrefetchQueues {
    loader: Arc<dyn AdLoader>,
    ready: watch::Receiver<bool>,
    config: PrefetchConfig,
    index: PrefetchIndex,
}

impl PrefetchQueues {
    pub fn new(
        loader: Arc<dyn AdLoader>,
        ready: watch::Receiver<bool>,
        config: PrefetchConfig,
    ) -> Self {
        Self::with_index(PrefetchIndex::new(), loader, ready, config)
    }

    /// Queues registered in an existing `index`.
    pub fn with_index(
        index: PrefetchIndex,
        loader: Arc<dyn AdLoader>,
        ready: watch::Receiver<bool>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            loader,
            ready,
            config,
            index,
        }
    }

    pub fn index(&self) -> &PrefetchIndex {
        &self.index
    }

    /// The queue for `placement`, created stopped on first use.
    ///
    /// An existing queue is returned as is, whatever `format` and `size`.
    pub fn queue(
        &self,
        placement: impl Into<PlacementId>,
        format: AdFormat,
        size: Option<AdSize>,
    ) -> Arc<PrefetchQueue> {
        let placement = placement.into();
        let queue = self.index.queues.entry(placement.clone()).or_insert_with(|| {
            let mut template = PlacementRequest::new(placement, format);
            template.size = size;
            Arc::new(PrefetchQueue::new(
                template,
                Arc::clone(&self.loader),
                self.ready.clone(),
                self.config,
            ))
        });
        Arc::clone(queue.value())
    }

    pub fn get(&self, placement: &PlacementId) -> Option<Arc<PrefetchQueue>> {
        self.index
            .queues
            .get(placement)
            .map(|queue| Arc::clone(queue.value()))
    }

    pub fn len(&self) -> usize {
        self.index.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.queues.is_empty()
    }

    /// Invalidate `load_id` in whichever queue holds it.
    pub fn invalidate(&self, load_id: &LoadId) -> bool {
        self.index.invalidate(load_id)
    }

    /// Stop every queue; entries stay queued.
    pub fn stop_all(&self) {
        for queue in self.index.queues.iter() {
            queue.stop();
        }
    }
}
