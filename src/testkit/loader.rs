//! Scripted [`AdLoader`] for prefetch tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::prefetch::AdLoader;
use crate::domain::ad::{LoadedAd, PlacementRequest};
use crate::error::MediationError;

use super::domain::loaded_ad;

/// Loader that fills instantly (or after a latency) unless set failing.
pub struct ScriptedLoader {
    loads: AtomicU32,
    discards: AtomicU32,
    failing: AtomicBool,
    latency: Duration,
    retry_delay: Duration,
}

impl Default for ScriptedLoader {
    fn default() -> Self {
        Self {
            loads: AtomicU32::new(0),
            discards: AtomicU32::new(0),
            failing: AtomicBool::new(false),
            latency: Duration::ZERO,
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Loads started, including ones later cancelled.
    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> u32 {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdLoader for ScriptedLoader {
    async fn load(&self, request: PlacementRequest) -> Result<LoadedAd, MediationError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MediationError::WaterfallExhausted { attempts: 0 });
        }
        Ok(loaded_ad(&request, "scripted"))
    }

    async fn discard(&self, _ad: LoadedAd) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }

    fn retry_delay(&self, _request: &PlacementRequest) -> Duration {
        self.retry_delay
    }
}
