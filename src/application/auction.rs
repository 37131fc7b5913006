//! One ad request end to end: gate, prebid, auction, waterfall, report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::ad::{LoadedAd, PlacementRequest};
use crate::domain::bid::BidSet;
use crate::domain::format::validate_size;
use crate::domain::id::AuctionId;
use crate::domain::metrics::{LifecycleEvent, PhaseReport, PhaseResult, WinnerEvent};
use crate::error::MediationError;
use crate::port::outbound::auction::{AuctionClient, AuctionError, AuctionRequest};
use crate::port::outbound::metrics::{MetricsEvent, MetricsSink};
use crate::port::outbound::partner::{PartnerAdListener, PrebidRequest};

use super::dispatch::{DispatchContext, PartnerDispatcher};
use super::prefetch::AdLoader;
use super::rate_limit::{RateLimiter, MAX_COOLDOWN};
use super::waterfall::{LoadContext, WaterfallLoader, WaterfallOutcome};

/// Auction-level policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionConfig {
    /// Honor server cooldowns; when off the limiter is still updated.
    pub enforce_rate_limit: bool,
    /// Deadline for each partner's bidder token.
    pub prebid_timeout: Duration,
    /// Deadline for invalidating discarded ads.
    pub invalidate_timeout: Duration,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            enforce_rate_limit: true,
            prebid_timeout: Duration::from_secs(5),
            invalidate_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs auctions for placements.
pub struct AuctionOrchestrator {
    dispatcher: Arc<PartnerDispatcher>,
    rate_limiter: Arc<RateLimiter>,
    auction_client: Arc<dyn AuctionClient>,
    waterfall: WaterfallLoader,
    metrics: Arc<dyn MetricsSink>,
    listener: Arc<dyn PartnerAdListener>,
    config: AuctionConfig,
}

impl AuctionOrchestrator {
    pub fn new(
        dispatcher: Arc<PartnerDispatcher>,
        rate_limiter: Arc<RateLimiter>,
        auction_client: Arc<dyn AuctionClient>,
        waterfall: WaterfallLoader,
        metrics: Arc<dyn MetricsSink>,
        listener: Arc<dyn PartnerAdListener>,
        config: AuctionConfig,
    ) -> Self {
        Self {
            dispatcher,
            rate_limiter,
            auction_client,
            waterfall,
            metrics,
            listener,
            config,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    /// Run a full auction and waterfall for `request`.
    ///
    /// Exactly one `Load` phase is flushed per call, whatever the outcome.
    pub async fn run_auction(&self, request: PlacementRequest) -> Result<LoadedAd, MediationError> {
        let started_at = Utc::now();
        let placement = request.placement.clone();

        let (auction_id, outcome) = self.auction_and_load(&request).await;

        let (result, records, phase_result) = match outcome {
            Stage::Failed(error) => {
                let phase_result = PhaseResult::Failure { error: error.kind() };
                (Err(error), Vec::new(), phase_result)
            }
            Stage::Loaded(outcome) => {
                let phase_result = match (&outcome.result, &outcome.last_failure) {
                    (Ok(_), _) => PhaseResult::Success,
                    (Err(_), Some((partner, error))) => PhaseResult::PartnerFailure {
                        partner: partner.clone(),
                        error: error.kind(),
                    },
                    (Err(error), None) => PhaseResult::Failure { error: error.kind() },
                };
                (outcome.result, outcome.records, phase_result)
            }
        };

        self.metrics.report(MetricsEvent::Phase(
            PhaseReport::new(LifecycleEvent::Load, started_at, phase_result, records)
                .with_placement(placement.clone())
                .with_load_id(request.load_id)
                .with_auction(auction_id),
        ));

        match &result {
            Ok(ad) => self.notify_winner(ad),
            Err(e) => info!(placement = %placement, error = %e, "Auction failed"),
        }

        result
    }

    async fn auction_and_load(&self, request: &PlacementRequest) -> (Option<AuctionId>, Stage) {
        let placement = &request.placement;

        let remaining_ms = self.rate_limiter.remaining_ms(placement);
        if remaining_ms > 0 {
            if self.config.enforce_rate_limit {
                debug!(placement = %placement, remaining_ms, "Placement rate limited");
                return (
                    None,
                    Stage::Failed(MediationError::RateLimited {
                        placement: placement.clone(),
                        remaining_ms,
                    }),
                );
            }
            debug!(placement = %placement, remaining_ms, "Rate limit not enforced");
        }

        if let Err(e) = validate_size(request.format, request.size) {
            return (None, Stage::Failed(e));
        }

        let prebid_started = Utc::now();
        let prebid = PrebidRequest {
            placement: placement.clone(),
            format: request.format,
            size: request.size,
            load_id: request.load_id,
        };
        let tokens = self
            .dispatcher
            .fetch_all_bidder_tokens(&prebid, self.config.prebid_timeout)
            .await;
        self.metrics.report(MetricsEvent::Phase(
            PhaseReport::new(
                LifecycleEvent::Prebid,
                prebid_started,
                PhaseResult::Success,
                tokens.records,
            )
            .with_placement(placement.clone())
            .with_load_id(request.load_id),
        ));

        let auction_request = AuctionRequest {
            placement: placement.clone(),
            format: request.format,
            size: request.size,
            load_id: request.load_id,
            keywords: request.keywords.clone(),
            bidder_tokens: tokens.tokens,
            rate_limit_secs: self.rate_limiter.limit_secs(placement),
        };

        let response = match self.auction_client.fetch_bids(&auction_request).await {
            Ok(response) => response,
            Err(e) => {
                if let AuctionError::RateLimited {
                    retry_after_secs: Some(seconds),
                } = e
                {
                    self.rate_limiter.set_limit(placement, seconds);
                }
                warn!(placement = %placement, error = %e, "Auction request failed");
                return (None, Stage::Failed(e.into_mediation(placement)));
            }
        };

        if let Some(seconds) = response.rate_limit_reset_secs() {
            self.rate_limiter.set_limit(placement, seconds);
        }

        let auction_id = response
            .auction_id
            .unwrap_or_else(|| AuctionId::new(request.load_id.to_string()));
        let mut bid_set = BidSet::new(auction_id.clone(), response.bids);
        debug!(
            placement = %placement,
            auction_id = %auction_id,
            bids = bid_set.len(),
            "Auction returned bids"
        );

        let context = LoadContext::new(request.clone(), Arc::clone(&self.listener));
        let outcome = self.waterfall.load_waterfall(&mut bid_set, &context).await;
        (Some(auction_id), Stage::Loaded(outcome))
    }

    fn notify_winner(&self, ad: &LoadedAd) {
        let event = WinnerEvent {
            auction_id: ad.auction_id.clone(),
            load_id: ad.load_id,
            placement: ad.placement.clone(),
            partner: ad.partner().clone(),
            line_item_id: ad.bid.line_item_id().map(str::to_string),
            price: ad.bid.price(),
        };
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            metrics.report(MetricsEvent::AuctionWinner(event));
        });
    }

    /// Invalidate a loaded ad that will never be shown.
    pub async fn discard(&self, ad: LoadedAd) {
        let context = DispatchContext {
            auction_id: Some(ad.auction_id.clone()),
            line_item_id: ad.bid.line_item_id().map(str::to_string),
            format: Some(ad.format),
            size: ad.requested_size,
            network_type: None,
        };
        let (result, _) = self
            .dispatcher
            .invalidate(&ad.partner_ad, self.config.invalidate_timeout, &context)
            .await;
        if let Err(e) = result {
            debug!(load_id = %ad.load_id, error = %e, "Discarded ad did not invalidate cleanly");
        }
    }

    /// Delay before retrying a failed load of `request`.
    pub fn retry_delay(&self, request: &PlacementRequest) -> Duration {
        let load_timeout = self.waterfall.config().load_timeout(request.format);
        let cooldown = Duration::from_secs(self.rate_limiter.limit_secs(&request.placement))
            .min(MAX_COOLDOWN);
        load_timeout.max(cooldown)
    }
}

enum Stage {
    Failed(MediationError),
    Loaded(WaterfallOutcome),
}

#[async_trait]
impl AdLoader for AuctionOrchestrator {
    async fn load(&self, request: PlacementRequest) -> Result<LoadedAd, MediationError> {
        self.run_auction(request).await
    }

    async fn discard(&self, ad: LoadedAd) {
        AuctionOrchestrator::discard(self, ad).await;
    }

    fn retry_delay(&self, request: &PlacementRequest) -> Duration {
        AuctionOrchestrator::retry_delay(self, request)
    }
}
