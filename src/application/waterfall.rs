//! Sequential waterfall over a ranked bid set.
//!
//! Bids are tried strictly in rank order, one at a time. The first partner
//! that loads wins; nothing after it is attempted. A failed or oversized
//! load advances the bid set cursor, which never moves backwards.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::ad::{LoadedAd, PartnerAd, PlacementRequest};
use crate::domain::bid::{Bid, BidSet};
use crate::domain::format::AdFormat;
use crate::domain::id::PartnerId;
use crate::domain::metrics::MetricsRecord;
use crate::error::MediationError;
use crate::port::outbound::partner::{PartnerAdListener, PartnerLoadRequest};

use super::dispatch::{DispatchContext, PartnerDispatcher};

/// Load policy of the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterfallConfig {
    pub banner_load_timeout: Duration,
    pub fullscreen_load_timeout: Duration,
    /// Deadline for invalidating a rejected creative.
    pub invalidate_timeout: Duration,
    /// Reject adaptive banners larger than the requested size.
    pub reject_oversized_banners: bool,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            banner_load_timeout: Duration::from_secs(15),
            fullscreen_load_timeout: Duration::from_secs(30),
            invalidate_timeout: Duration::from_secs(5),
            reject_oversized_banners: true,
        }
    }
}

impl WaterfallConfig {
    /// Load timeout for `format`.
    pub fn load_timeout(&self, format: AdFormat) -> Duration {
        if format.is_banner() {
            self.banner_load_timeout
        } else {
            self.fullscreen_load_timeout
        }
    }
}

/// Request-side data a waterfall walk needs besides the bids.
#[derive(Clone)]
pub struct LoadContext {
    pub request: PlacementRequest,
    pub listener: Arc<dyn PartnerAdListener>,
    pub network_type: Option<String>,
}

impl LoadContext {
    pub fn new(request: PlacementRequest, listener: Arc<dyn PartnerAdListener>) -> Self {
        Self {
            request,
            listener,
            network_type: None,
        }
    }
}

/// Result of one waterfall walk plus the load metrics it produced.
#[derive(Debug)]
pub struct WaterfallOutcome {
    pub result: Result<LoadedAd, MediationError>,
    /// One record per dispatched partner call, in call order.
    pub records: Vec<MetricsRecord>,
    /// Partner and error of the last failed attempt, if any.
    pub last_failure: Option<(PartnerId, MediationError)>,
}

/// Walks a [`BidSet`] through the dispatcher.
pub struct WaterfallLoader {
    dispatcher: Arc<PartnerDispatcher>,
    config: WaterfallConfig,
}

impl WaterfallLoader {
    pub fn new(dispatcher: Arc<PartnerDispatcher>, config: WaterfallConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &WaterfallConfig {
        &self.config
    }

    /// Try every bid in rank order until one loads.
    pub async fn load_waterfall(
        &self,
        bid_set: &mut BidSet,
        context: &LoadContext,
    ) -> WaterfallOutcome {
        let request = &context.request;
        let timeout = self.config.load_timeout(request.format);
        let mut records = Vec::new();
        let mut last_failure = None;
        let mut attempts = 0usize;

        while let Some(bid) = bid_set.active_bid().cloned() {
            attempts += 1;
            let partner = bid.partner().clone();
            let dispatch_context = DispatchContext {
                auction_id: Some(bid_set.auction_id().clone()),
                line_item_id: bid.line_item_id().map(str::to_string),
                format: Some(request.format),
                size: request.size,
                network_type: context.network_type.clone(),
            };

            debug!(
                partner = %partner,
                placement = %request.placement,
                rank = bid_set.active_bid_index(),
                price = %bid.price(),
                "Waterfall attempt"
            );

            let (result, mut record) = self
                .dispatcher
                .load(
                    &partner,
                    load_request(&bid, request),
                    Arc::clone(&context.listener),
                    timeout,
                    &dispatch_context,
                )
                .await;

            let partner_ad = match result {
                Ok(ad) => ad,
                Err(e) => {
                    records.push(record);
                    last_failure = Some((partner, e));
                    bid_set.increment_active_bid();
                    continue;
                }
            };

            if let Some(oversize) = self.oversized(request, &partner, &partner_ad) {
                warn!(
                    partner = %partner,
                    placement = %request.placement,
                    error = %oversize,
                    "Rejecting oversized banner"
                );
                record.reject(oversize.kind());
                records.push(record);
                // Best effort; the outcome does not affect the walk.
                let (invalidated, invalidate_record) = self
                    .dispatcher
                    .invalidate(&partner_ad, self.config.invalidate_timeout, &dispatch_context)
                    .await;
                if let Err(e) = invalidated {
                    debug!(partner = %partner, error = %e, "Oversized banner did not invalidate cleanly");
                }
                records.push(invalidate_record);
                last_failure = Some((partner, oversize));
                bid_set.increment_active_bid();
                continue;
            }

            records.push(record);

            let auction_id = bid_set.auction_id().clone();
            let Some(winning_bid) = bid_set.active_bid_mut() else {
                break;
            };
            if let Some(ilrd) = partner_ad.ilrd.clone() {
                winning_bid.merge_ilrd(ilrd);
            }
            let bid = winning_bid.clone();

            info!(
                partner = %partner,
                placement = %request.placement,
                auction_id = %auction_id,
                attempts,
                "Waterfall filled"
            );

            let loaded = LoadedAd {
                load_id: request.load_id,
                placement: request.placement.clone(),
                format: request.format,
                requested_size: request.size,
                auction_id,
                bid,
                partner_ad,
                loaded_at: Instant::now(),
            };
            return WaterfallOutcome {
                result: Ok(loaded),
                records,
                last_failure,
            };
        }

        info!(
            placement = %request.placement,
            attempts,
            "Waterfall exhausted"
        );

        WaterfallOutcome {
            result: Err(MediationError::WaterfallExhausted { attempts }),
            records,
            last_failure,
        }
    }

    /// Size-policy violation of a successful adaptive banner load.
    ///
    /// A partner that reports no dimensions is accepted.
    fn oversized(
        &self,
        request: &PlacementRequest,
        partner: &PartnerId,
        ad: &PartnerAd,
    ) -> Option<MediationError> {
        if request.format != AdFormat::AdaptiveBanner || !self.config.reject_oversized_banners {
            return None;
        }
        let requested = request.size?;
        let actual = ad.reported_size()?;
        actual
            .exceeds(&requested)
            .then(|| MediationError::OversizedCreative {
                partner: partner.clone(),
                requested,
                actual,
            })
    }
}

fn load_request(bid: &Bid, request: &PlacementRequest) -> PartnerLoadRequest {
    PartnerLoadRequest {
        load_id: request.load_id,
        placement: request.placement.clone(),
        partner_placement: bid.partner_placement().to_string(),
        format: request.format,
        size: bid.size().or(request.size),
        adm: bid.adm().map(str::to_string),
        partner_settings: bid.partner_settings().clone(),
        keywords: request.keywords.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::format::AdSize;

    #[test]
    fn load_request_carries_bid_payload() {
        let settings = HashMap::from([("floor".to_string(), "0.5".to_string())]);
        let bid = Bid::new("alpha", "p", "alpha-unit", dec!(1.0))
            .with_adm("<markup/>")
            .with_partner_settings(settings.clone());
        let request = PlacementRequest::new("p", AdFormat::Banner)
            .with_size(AdSize::STANDARD)
            .with_keyword("level", "3");

        let partner_request = load_request(&bid, &request);

        assert_eq!(partner_request.load_id, request.load_id);
        assert_eq!(partner_request.partner_placement, "alpha-unit");
        assert_eq!(partner_request.adm.as_deref(), Some("<markup/>"));
        assert_eq!(partner_request.partner_settings, settings);
        assert_eq!(partner_request.keywords["level"], "3");
        assert_eq!(partner_request.size, Some(AdSize::STANDARD));
    }

    #[test]
    fn bid_size_overrides_requested_size() {
        let bid = Bid::new("alpha", "p", "alpha-unit", dec!(1.0)).with_size(AdSize::MEDIUM);
        let request = PlacementRequest::new("p", AdFormat::Banner).with_size(AdSize::STANDARD);

        assert_eq!(load_request(&bid, &request).size, Some(AdSize::MEDIUM));
    }

    #[test]
    fn timeout_depends_on_format() {
        let config = WaterfallConfig::default();
        assert_eq!(config.load_timeout(AdFormat::AdaptiveBanner), Duration::from_secs(15));
        assert_eq!(config.load_timeout(AdFormat::Rewarded), Duration::from_secs(30));
    }
}
