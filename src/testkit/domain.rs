//! Builders for domain primitives used across tests.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::application::registry::AdapterRegistry;
use crate::domain::ad::{LoadedAd, PartnerAd, PlacementRequest};
use crate::domain::bid::{Bid, BidSet};
use crate::domain::format::AdFormat;
use crate::domain::id::{AuctionId, LoadId, PlacementId};
use crate::port::outbound::partner::{PartnerAdapter, PartnerLoadRequest, PrebidRequest};

/// A bid for `partner` on placement `p` at `price`.
pub fn bid(partner: &str, price: Decimal) -> Bid {
    Bid::new(partner, "p", format!("{partner}-placement"), price)
        .with_line_item_id(format!("li-{partner}"))
}

/// A bid set in the order given; prices must already be descending for the
/// given order to be the rank order.
pub fn bid_set(bids: Vec<Bid>) -> BidSet {
    BidSet::new(AuctionId::from("auction-1"), bids)
}

/// Bids at strictly descending prices, one per partner, in the given order.
pub fn ranked_bids(partners: &[&str]) -> Vec<Bid> {
    let top = partners.len() as i64 + 1;
    partners
        .iter()
        .enumerate()
        .map(|(rank, partner)| bid(partner, Decimal::new(top - rank as i64, 0)))
        .collect()
}

pub fn prebid_request(placement: &str, format: AdFormat) -> PrebidRequest {
    PrebidRequest {
        placement: PlacementId::from(placement),
        format,
        size: None,
        load_id: LoadId::generate(),
    }
}

pub fn partner_load_request(placement: &str, load_id: LoadId) -> PartnerLoadRequest {
    PartnerLoadRequest {
        load_id,
        placement: PlacementId::from(placement),
        partner_placement: format!("{placement}-partner"),
        format: AdFormat::Interstitial,
        size: None,
        adm: None,
        partner_settings: HashMap::new(),
        keywords: HashMap::new(),
    }
}

/// A loaded ad for `request`, won by `partner`.
pub fn loaded_ad(request: &PlacementRequest, partner: &str) -> LoadedAd {
    let bid = Bid::new(
        partner,
        request.placement.clone(),
        format!("{partner}-placement"),
        Decimal::ONE,
    );
    LoadedAd {
        load_id: request.load_id,
        placement: request.placement.clone(),
        format: request.format,
        requested_size: request.size,
        auction_id: AuctionId::new(format!("auction-{}", request.load_id)),
        partner_ad: PartnerAd::new(bid.partner().clone(), request.load_id),
        bid,
        loaded_at: Instant::now(),
    }
}

/// A registry where every adapter is already routable.
pub fn registry_with(adapters: Vec<Arc<dyn PartnerAdapter>>) -> Arc<AdapterRegistry> {
    let registry = Arc::new(AdapterRegistry::new());
    for adapter in adapters {
        registry.register_initialized(adapter);
    }
    registry
}
