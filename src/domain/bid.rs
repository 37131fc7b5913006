//! Bid candidates and the ranked set one auction produces.
//!
//! A [`BidSet`] owns the bids of a single auction, ordered by price with the
//! highest first, plus a cursor that only moves forward. The waterfall loader
//! is the single writer of that cursor.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::format::AdSize;
use super::id::{AuctionId, PartnerId, PlacementId};

/// Impression-level revenue data attached to a bid.
pub type Ilrd = Map<String, Value>;

/// One partner's offer for an ad request.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    partner: PartnerId,
    placement: PlacementId,
    partner_placement: String,
    price: Decimal,
    ad_revenue: Option<Decimal>,
    adm: Option<String>,
    line_item_id: Option<String>,
    size: Option<AdSize>,
    partner_settings: HashMap<String, String>,
    ilrd: Option<Ilrd>,
}

impl Bid {
    /// Create a bid with the required fields; optional fields use `with_*`.
    pub fn new(
        partner: impl Into<PartnerId>,
        placement: impl Into<PlacementId>,
        partner_placement: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            partner: partner.into(),
            placement: placement.into(),
            partner_placement: partner_placement.into(),
            price,
            ad_revenue: None,
            adm: None,
            line_item_id: None,
            size: None,
            partner_settings: HashMap::new(),
            ilrd: None,
        }
    }

    #[must_use]
    pub fn with_adm(mut self, adm: impl Into<String>) -> Self {
        self.adm = Some(adm.into());
        self
    }

    /// Revenue the server expects for this bid, when it differs from `price`.
    #[must_use]
    pub fn with_ad_revenue(mut self, revenue: Decimal) -> Self {
        self.ad_revenue = Some(revenue);
        self
    }

    #[must_use]
    pub fn with_line_item_id(mut self, id: impl Into<String>) -> Self {
        self.line_item_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: AdSize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_partner_settings(mut self, settings: HashMap<String, String>) -> Self {
        self.partner_settings = settings;
        self
    }

    #[must_use]
    pub fn with_ilrd(mut self, ilrd: Ilrd) -> Self {
        self.ilrd = Some(ilrd);
        self
    }

    pub fn partner(&self) -> &PartnerId {
        &self.partner
    }

    pub fn placement(&self) -> &PlacementId {
        &self.placement
    }

    pub fn partner_placement(&self) -> &str {
        &self.partner_placement
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn ad_revenue(&self) -> Option<Decimal> {
        self.ad_revenue
    }

    pub fn adm(&self) -> Option<&str> {
        self.adm.as_deref()
    }

    /// True when the bid came from real-time bidding (carries markup).
    pub fn is_programmatic(&self) -> bool {
        self.adm.is_some()
    }

    pub fn line_item_id(&self) -> Option<&str> {
        self.line_item_id.as_deref()
    }

    pub fn size(&self) -> Option<AdSize> {
        self.size
    }

    pub fn partner_settings(&self) -> &HashMap<String, String> {
        &self.partner_settings
    }

    pub fn ilrd(&self) -> Option<&Ilrd> {
        self.ilrd.as_ref()
    }

    /// Refine the price after construction.
    ///
    /// A bid already ranked in a [`BidSet`] keeps its rank.
    pub fn set_price(&mut self, price: Decimal) {
        self.price = price;
    }

    pub fn set_ad_revenue(&mut self, revenue: Option<Decimal>) {
        self.ad_revenue = revenue;
    }

    /// Merge partner-reported ILRD entries into this bid's ILRD.
    ///
    /// Partner values override existing keys.
    pub fn merge_ilrd(&mut self, partner_ilrd: Ilrd) {
        if partner_ilrd.is_empty() {
            return;
        }
        self.ilrd
            .get_or_insert_with(Map::new)
            .extend(partner_ilrd);
    }
}

/// Ranked bids for one auction with a forward-only cursor.
#[derive(Debug, Clone)]
pub struct BidSet {
    auction_id: AuctionId,
    bids: Vec<Bid>,
    active_bid_index: usize,
}

impl BidSet {
    /// Build a set from auction bids, ranking them by price descending.
    ///
    /// Ties keep the order the auction server returned them in.
    pub fn new(auction_id: AuctionId, mut bids: Vec<Bid>) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        Self {
            auction_id,
            bids,
            active_bid_index: 0,
        }
    }

    pub fn auction_id(&self) -> &AuctionId {
        &self.auction_id
    }

    /// The bid under the cursor, or `None` once every bid was tried.
    pub fn active_bid(&self) -> Option<&Bid> {
        self.bids.get(self.active_bid_index)
    }

    pub fn active_bid_mut(&mut self) -> Option<&mut Bid> {
        self.bids.get_mut(self.active_bid_index)
    }

    pub fn active_bid_index(&self) -> usize {
        self.active_bid_index
    }

    /// Advance the cursor. Saturates one past the last bid.
    pub fn increment_active_bid(&mut self) {
        if self.active_bid_index < self.bids.len() {
            self.active_bid_index += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.active_bid_index >= self.bids.len()
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}
