//! Top-level mediation facade.
//!
//! [`Mediator`] owns one instance of every engine component and is the only
//! place they are wired together. Loaded ads are cached under their
//! [`LoadId`] until shown, invalidated, or expired by their partner.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::ad::{LoadedAd, PartnerAd, PlacementRequest};
use crate::domain::format::{AdFormat, AdSize};
use crate::domain::id::{LoadId, PartnerId, PlacementId};
use crate::domain::metrics::{LifecycleEvent, MetricsRecord, PhaseReport, PhaseResult};
use crate::error::{ErrorKind, MediationError};
use crate::port::outbound::auction::AuctionClient;
use crate::port::outbound::metrics::{MetricsEvent, MetricsSink};
use crate::port::outbound::partner::{
    ConsentMap, PartnerAdEvent, PartnerAdListener, PartnerConfig,
};

use super::auction::{AuctionConfig, AuctionOrchestrator};
use super::dispatch::{DispatchContext, PartnerDispatcher};
use super::prefetch::{AdLoader, PrefetchConfig, PrefetchIndex, PrefetchQueue, PrefetchQueues};
use super::rate_limit::RateLimiter;
use super::registry::{AdapterFactories, AdapterRegistry, InitializationReport};
use super::waterfall::{WaterfallConfig, WaterfallLoader};

/// Runtime settings of a [`Mediator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediatorSettings {
    pub auction: AuctionConfig,
    pub waterfall: WaterfallConfig,
    pub prefetch: PrefetchConfig,
    pub show_timeout: Duration,
    pub init_partner_timeout: Duration,
    pub init_overall_timeout: Duration,
}

impl Default for MediatorSettings {
    fn default() -> Self {
        Self {
            auction: AuctionConfig::default(),
            waterfall: WaterfallConfig::default(),
            prefetch: PrefetchConfig::default(),
            show_timeout: Duration::from_secs(5),
            init_partner_timeout: Duration::from_secs(30),
            init_overall_timeout: Duration::from_secs(10),
        }
    }
}

type AdCache = DashMap<LoadId, LoadedAd>;

/// Routes partner ad events back into the cache and the prefetch queues.
struct CacheListener {
    cache: Arc<AdCache>,
    prefetch: PrefetchIndex,
}

impl PartnerAdListener for CacheListener {
    fn on_event(&self, ad: &PartnerAd, event: PartnerAdEvent) {
        match event {
            PartnerAdEvent::Expired => {
                if self.cache.remove(&ad.load_id).is_some() {
                    info!(partner = %ad.partner, load_id = %ad.load_id, "Cached ad expired by partner");
                } else if self.prefetch.invalidate(&ad.load_id) {
                    info!(partner = %ad.partner, load_id = %ad.load_id, "Queued ad expired by partner");
                }
            }
            other => {
                debug!(partner = %ad.partner, load_id = %ad.load_id, event = ?other, "Partner ad event");
            }
        }
    }
}

/// Engine entry point for the surrounding SDK.
pub struct Mediator {
    factories: AdapterFactories,
    registry: Arc<AdapterRegistry>,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Arc<PartnerDispatcher>,
    orchestrator: Arc<AuctionOrchestrator>,
    metrics: Arc<dyn MetricsSink>,
    cache: Arc<AdCache>,
    prefetch: PrefetchQueues,
    ready: watch::Sender<bool>,
    settings: MediatorSettings,
}

impl Mediator {
    pub fn new(
        factories: AdapterFactories,
        auction_client: Arc<dyn AuctionClient>,
        metrics: Arc<dyn MetricsSink>,
        settings: MediatorSettings,
    ) -> Self {
        let registry = Arc::new(AdapterRegistry::new());
        let rate_limiter = Arc::new(RateLimiter::new());
        let dispatcher = Arc::new(PartnerDispatcher::new(Arc::clone(&registry)));
        let cache = Arc::new(AdCache::new());
        let index = PrefetchIndex::new();
        let listener: Arc<dyn PartnerAdListener> = Arc::new(CacheListener {
            cache: Arc::clone(&cache),
            prefetch: index.clone(),
        });

        let orchestrator = Arc::new(AuctionOrchestrator::new(
            Arc::clone(&dispatcher),
            Arc::clone(&rate_limiter),
            auction_client,
            WaterfallLoader::new(Arc::clone(&dispatcher), settings.waterfall),
            Arc::clone(&metrics),
            listener,
            settings.auction,
        ));

        let (ready, ready_rx) = watch::channel(false);
        let loader: Arc<dyn AdLoader> = Arc::clone(&orchestrator) as Arc<dyn AdLoader>;
        let prefetch = PrefetchQueues::with_index(index, loader, ready_rx, settings.prefetch);

        Self {
            factories,
            registry,
            rate_limiter,
            dispatcher,
            orchestrator,
            metrics,
            cache,
            prefetch,
            ready,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn orchestrator(&self) -> &Arc<AuctionOrchestrator> {
        &self.orchestrator
    }

    /// Whether initialization has reported.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Receiver that turns `true` once initialization has reported.
    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Initialize partners and flip the readiness signal.
    ///
    /// Returns once every partner finished or the overall deadline fired.
    pub async fn initialize(
        &self,
        configs: Vec<PartnerConfig>,
        skip: &HashSet<PartnerId>,
    ) -> InitializationReport {
        let started_at = Utc::now();
        let report = self
            .registry
            .initialize_all(
                &self.factories,
                configs,
                skip,
                self.settings.init_partner_timeout,
                self.settings.init_overall_timeout,
            )
            .await;

        let result = match report.failed().next() {
            None => PhaseResult::Success,
            Some(partner) => PhaseResult::PartnerFailure {
                partner: partner.clone(),
                error: ErrorKind::PartnerInitFailed,
            },
        };
        self.metrics.report(MetricsEvent::Phase(PhaseReport::new(
            LifecycleEvent::Initialization,
            started_at,
            result,
            report.records(),
        )));

        self.ready.send_replace(true);
        report
    }

    /// Run an auction for `request` and cache the winner.
    pub async fn load(&self, request: PlacementRequest) -> Result<LoadedAd, MediationError> {
        let ad = self.orchestrator.run_auction(request).await?;
        self.cache.insert(ad.load_id, ad.clone());
        Ok(ad)
    }

    /// Take a prefetched ad for `placement` and cache it for showing.
    pub fn load_prefetched(&self, placement: &PlacementId) -> Option<LoadedAd> {
        let ad = self.prefetch.get(placement)?.pop()?;
        self.cache.insert(ad.load_id, ad.clone());
        Some(ad)
    }

    /// A cached ad, if still loaded.
    pub fn cached(&self, load_id: &LoadId) -> Option<LoadedAd> {
        self.cache.get(load_id).map(|ad| ad.clone())
    }

    /// Show a cached ad. It leaves the cache whatever the outcome.
    pub async fn show(&self, load_id: &LoadId) -> Result<PartnerAd, MediationError> {
        let Some((_, ad)) = self.cache.remove(load_id) else {
            return Err(MediationError::InvalidRequest {
                reason: format!("no cached ad for load {load_id}"),
            });
        };

        let started_at = Utc::now();
        let (result, record) = self
            .dispatcher
            .show(&ad.partner_ad, self.settings.show_timeout, &context_of(&ad))
            .await;
        self.flush(LifecycleEvent::Show, started_at, &ad, &result, record);
        result
    }

    /// Release a cached or prefetched ad on its partner.
    ///
    /// A prefetched ad is dropped from its queue, which fetches a replacement.
    pub async fn invalidate(&self, load_id: &LoadId) -> Result<(), MediationError> {
        let Some((_, ad)) = self.cache.remove(load_id) else {
            if self.prefetch.invalidate(load_id) {
                return Ok(());
            }
            return Err(MediationError::InvalidateNotFound { load_id: *load_id });
        };

        let started_at = Utc::now();
        let (result, record) = self
            .dispatcher
            .invalidate(
                &ad.partner_ad,
                self.orchestrator.config().invalidate_timeout,
                &context_of(&ad),
            )
            .await;
        if let Err(e) = &result {
            warn!(load_id = %load_id, error = %e, "Invalidate failed");
        }
        self.flush(LifecycleEvent::Invalidate, started_at, &ad, &result, record);
        result
    }

    fn flush<T>(
        &self,
        phase: LifecycleEvent,
        started_at: chrono::DateTime<Utc>,
        ad: &LoadedAd,
        result: &Result<T, MediationError>,
        record: MetricsRecord,
    ) {
        let phase_result = match result {
            Ok(_) => PhaseResult::Success,
            Err(e) => PhaseResult::PartnerFailure {
                partner: ad.partner().clone(),
                error: e.kind(),
            },
        };
        self.metrics.report(MetricsEvent::Phase(
            PhaseReport::new(phase, started_at, phase_result, vec![record])
                .with_placement(ad.placement.clone())
                .with_load_id(ad.load_id)
                .with_auction(Some(ad.auction_id.clone())),
        ));
    }

    /// The prefetch queue of `placement`, created stopped on first use.
    pub fn prefetch_queue(
        &self,
        placement: impl Into<PlacementId>,
        format: AdFormat,
        size: Option<AdSize>,
    ) -> Arc<PrefetchQueue> {
        self.prefetch.queue(placement, format, size)
    }

    pub fn set_consents(&self, consents: ConsentMap) {
        self.registry.set_consents(consents);
    }

    pub fn set_underage(&self, underage: bool) {
        self.registry.set_underage(underage);
    }

    /// Stop every prefetch queue.
    pub fn shutdown(&self) {
        self.prefetch.stop_all();
        info!(cached = self.cache.len(), "Mediator shut down");
    }
}

fn context_of(ad: &LoadedAd) -> DispatchContext {
    DispatchContext {
        auction_id: Some(ad.auction_id.clone()),
        line_item_id: ad.bid.line_item_id().map(str::to_string),
        format: Some(ad.format),
        size: ad.requested_size,
        network_type: None,
    }
}
