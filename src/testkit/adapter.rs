//! Scripted [`PartnerAdapter`] for tests.
//!
//! Each operation follows a [`Behavior`] chosen up front. Call counts live in
//! shared atomics, and an optional [`AttemptLog`] shared across adapters
//! records the order in which partners were asked to load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::registry::AdapterFactory;
use crate::domain::ad::{PartnerAd, BANNER_HEIGHT_DETAIL, BANNER_WIDTH_DETAIL};
use crate::domain::bid::Ilrd;
use crate::domain::format::AdSize;
use crate::domain::id::PartnerId;
use crate::port::outbound::partner::{
    BidderTokens, ConsentMap, PartnerAdEvent, PartnerAdListener, PartnerAdapter, PartnerConfig,
    PartnerError, PartnerLoadRequest, PrebidRequest,
};

/// How a scripted operation ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Never completes.
    Hang,
    Panic,
    /// Succeeds after the given delay.
    Delay(Duration),
}

impl Behavior {
    async fn perform<T>(self, operation: &str, value: impl FnOnce() -> T) -> Result<T, PartnerError> {
        match self {
            Self::Succeed => Ok(value()),
            Self::Fail => Err(PartnerError::Failed(format!("scripted {operation} failure"))),
            Self::Hang => std::future::pending().await,
            Self::Panic => panic!("scripted {operation} panic"),
            Self::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(value())
            }
        }
    }
}

/// Shared, ordered log of load attempts.
pub type AttemptLog = Arc<Mutex<Vec<PartnerId>>>;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub set_up: AtomicU32,
    pub prebid: AtomicU32,
    pub load: AtomicU32,
    pub show: AtomicU32,
    pub invalidate: AtomicU32,
}

impl CallCounters {
    pub fn set_up(&self) -> u32 {
        self.set_up.load(Ordering::SeqCst)
    }

    pub fn prebid(&self) -> u32 {
        self.prebid.load(Ordering::SeqCst)
    }

    pub fn load(&self) -> u32 {
        self.load.load(Ordering::SeqCst)
    }

    pub fn show(&self) -> u32 {
        self.show.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) -> u32 {
        self.invalidate.load(Ordering::SeqCst)
    }

    /// Calls of every kind after set-up.
    pub fn network(&self) -> u32 {
        self.prebid() + self.load() + self.show() + self.invalidate()
    }
}

/// A partner adapter whose every operation is scripted.
pub struct ScriptedAdapter {
    partner: PartnerId,
    set_up: Behavior,
    prebid: Behavior,
    load: Behavior,
    show: Behavior,
    invalidate: Behavior,
    tokens: BidderTokens,
    details: HashMap<String, String>,
    ilrd: Option<Ilrd>,
    counters: Arc<CallCounters>,
    attempts: Option<AttemptLog>,
    consents: Mutex<Option<ConsentMap>>,
    underage: Mutex<Option<bool>>,
    loaded: Mutex<Vec<(PartnerAd, Arc<dyn PartnerAdListener>)>>,
}

impl ScriptedAdapter {
    pub const PARTNER_VERSION: &'static str = "9.1.0";
    pub const ADAPTER_VERSION: &'static str = "9.1.0.0";

    /// An adapter whose every operation succeeds with an empty token.
    pub fn new(partner: &str) -> Self {
        Self {
            partner: PartnerId::from(partner),
            set_up: Behavior::Succeed,
            prebid: Behavior::Succeed,
            load: Behavior::Succeed,
            show: Behavior::Succeed,
            invalidate: Behavior::Succeed,
            tokens: BidderTokens::new(),
            details: HashMap::new(),
            ilrd: None,
            counters: Arc::new(CallCounters::default()),
            attempts: None,
            consents: Mutex::new(None),
            underage: Mutex::new(None),
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_set_up(mut self, behavior: Behavior) -> Self {
        self.set_up = behavior;
        self
    }

    pub fn with_prebid(mut self, behavior: Behavior) -> Self {
        self.prebid = behavior;
        self
    }

    pub fn with_load(mut self, behavior: Behavior) -> Self {
        self.load = behavior;
        self
    }

    pub fn with_show(mut self, behavior: Behavior) -> Self {
        self.show = behavior;
        self
    }

    pub fn with_invalidate(mut self, behavior: Behavior) -> Self {
        self.invalidate = behavior;
        self
    }

    pub fn with_token(mut self, key: &str, value: &str) -> Self {
        self.tokens.insert(key.to_string(), value.to_string());
        self
    }

    /// Report this creative size on every loaded ad.
    pub fn with_reported_size(mut self, size: AdSize) -> Self {
        self.details
            .insert(BANNER_WIDTH_DETAIL.to_string(), size.width.to_string());
        self.details
            .insert(BANNER_HEIGHT_DETAIL.to_string(), size.height.to_string());
        self
    }

    pub fn with_ilrd(mut self, ilrd: Ilrd) -> Self {
        self.ilrd = Some(ilrd);
        self
    }

    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempts = Some(log);
        self
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        Arc::clone(&self.counters)
    }

    pub fn into_arc(self) -> Arc<dyn PartnerAdapter> {
        Arc::new(self)
    }

    pub fn consents(&self) -> Option<ConsentMap> {
        self.consents.lock().clone()
    }

    pub fn underage(&self) -> Option<bool> {
        *self.underage.lock()
    }

    /// Raise `event` on the most recently loaded ad.
    ///
    /// Returns `false` when nothing was loaded yet.
    pub fn emit(&self, event: PartnerAdEvent) -> bool {
        let last = self.loaded.lock().last().cloned();
        match last {
            Some((ad, listener)) => {
                listener.on_event(&ad, event);
                true
            }
            None => false,
        }
    }
}

/// Factory handing out clones of one shared adapter.
pub fn factory(adapter: &Arc<ScriptedAdapter>) -> AdapterFactory {
    let adapter = Arc::clone(adapter);
    Arc::new(move || Arc::clone(&adapter) as Arc<dyn PartnerAdapter>)
}

/// New empty attempt log.
pub fn attempt_log() -> AttemptLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[async_trait]
impl PartnerAdapter for ScriptedAdapter {
    fn partner_id(&self) -> PartnerId {
        self.partner.clone()
    }

    fn partner_version(&self) -> String {
        Self::PARTNER_VERSION.to_string()
    }

    fn adapter_version(&self) -> String {
        Self::ADAPTER_VERSION.to_string()
    }

    async fn set_up(&self, _config: &PartnerConfig) -> Result<(), PartnerError> {
        self.counters.set_up.fetch_add(1, Ordering::SeqCst);
        self.set_up.perform("set_up", || ()).await
    }

    async fn fetch_bidder_information(
        &self,
        _request: &PrebidRequest,
    ) -> Result<BidderTokens, PartnerError> {
        self.counters.prebid.fetch_add(1, Ordering::SeqCst);
        self.prebid.perform("prebid", || self.tokens.clone()).await
    }

    async fn load(
        &self,
        request: &PartnerLoadRequest,
        listener: Arc<dyn PartnerAdListener>,
    ) -> Result<PartnerAd, PartnerError> {
        self.counters.load.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.attempts {
            log.lock().push(self.partner.clone());
        }

        let ad = self
            .load
            .perform("load", || {
                let mut ad = PartnerAd::new(self.partner.clone(), request.load_id);
                ad.details = self.details.clone();
                ad.ilrd = self.ilrd.clone();
                ad
            })
            .await?;
        self.loaded.lock().push((ad.clone(), listener));
        Ok(ad)
    }

    async fn show(&self, ad: &PartnerAd) -> Result<PartnerAd, PartnerError> {
        self.counters.show.fetch_add(1, Ordering::SeqCst);
        self.show.perform("show", || ad.clone()).await
    }

    async fn invalidate(&self, _ad: &PartnerAd) -> Result<(), PartnerError> {
        self.counters.invalidate.fetch_add(1, Ordering::SeqCst);
        self.invalidate.perform("invalidate", || ()).await
    }

    fn set_consents(&self, consents: &ConsentMap) {
        *self.consents.lock() = Some(consents.clone());
    }

    fn set_underage(&self, underage: bool) {
        *self.underage.lock() = Some(underage);
    }
}
