//! Ad requests and loaded ads.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use super::bid::{Bid, Ilrd};
use super::format::{AdFormat, AdSize};
use super::id::{AuctionId, LoadId, PartnerId, PlacementId};

/// Detail key under which banner adapters report the creative width.
pub const BANNER_WIDTH_DETAIL: &str = "banner_width_dips";

/// Detail key under which banner adapters report the creative height.
pub const BANNER_HEIGHT_DETAIL: &str = "banner_height_dips";

/// A publisher's request for an ad on one placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub size: Option<AdSize>,
    pub keywords: HashMap<String, String>,
    pub load_id: LoadId,
}

impl PlacementRequest {
    pub fn new(placement: impl Into<PlacementId>, format: AdFormat) -> Self {
        Self {
            placement: placement.into(),
            format,
            size: None,
            keywords: HashMap::new(),
            load_id: LoadId::generate(),
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: AdSize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    /// Same request under a fresh load ID.
    #[must_use]
    pub fn renewed(&self) -> Self {
        Self {
            load_id: LoadId::generate(),
            ..self.clone()
        }
    }
}

/// An ad as loaded by a partner adapter.
///
/// `details` is the adapter's untyped key/value report; `sdk_ad` holds the
/// partner SDK's own ad object, opaque to the engine.
#[derive(Clone)]
pub struct PartnerAd {
    pub partner: PartnerId,
    pub load_id: LoadId,
    pub details: HashMap<String, String>,
    pub ilrd: Option<Ilrd>,
    pub sdk_ad: Option<Arc<dyn Any + Send + Sync>>,
}

impl PartnerAd {
    pub fn new(partner: PartnerId, load_id: LoadId) -> Self {
        Self {
            partner,
            load_id,
            details: HashMap::new(),
            ilrd: None,
            sdk_ad: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Creative size as reported in the details map.
    ///
    /// Returns `None` unless both dimensions are present and numeric.
    pub fn reported_size(&self) -> Option<AdSize> {
        let width = self.details.get(BANNER_WIDTH_DETAIL)?.trim().parse().ok()?;
        let height = self.details.get(BANNER_HEIGHT_DETAIL)?.trim().parse().ok()?;
        Some(AdSize::new(width, height))
    }
}

impl fmt::Debug for PartnerAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerAd")
            .field("partner", &self.partner)
            .field("load_id", &self.load_id)
            .field("details", &self.details)
            .field("ilrd", &self.ilrd)
            .field("sdk_ad", &self.sdk_ad.as_ref().map(|_| ".."))
            .finish()
    }
}

/// The winner of a waterfall, ready to show.
#[derive(Debug, Clone)]
pub struct LoadedAd {
    pub load_id: LoadId,
    pub placement: PlacementId,
    pub format: AdFormat,
    pub requested_size: Option<AdSize>,
    pub auction_id: AuctionId,
    pub bid: Bid,
    pub partner_ad: PartnerAd,
    pub loaded_at: Instant,
}

impl LoadedAd {
    pub fn partner(&self) -> &PartnerId {
        self.bid.partner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_size_needs_both_dimensions() {
        let ad = PartnerAd::new(PartnerId::from("alpha"), LoadId::generate())
            .with_detail(BANNER_WIDTH_DETAIL, "400");
        assert!(ad.reported_size().is_none());

        let ad = ad.with_detail(BANNER_HEIGHT_DETAIL, "50");
        assert_eq!(ad.reported_size(), Some(AdSize::new(400, 50)));
    }

    #[test]
    fn reported_size_ignores_garbage() {
        let ad = PartnerAd::new(PartnerId::from("alpha"), LoadId::generate())
            .with_detail(BANNER_WIDTH_DETAIL, "wide")
            .with_detail(BANNER_HEIGHT_DETAIL, "50");
        assert!(ad.reported_size().is_none());
    }

    #[test]
    fn renewed_request_gets_new_load_id() {
        let request = PlacementRequest::new("banner-home", AdFormat::Banner).with_size(AdSize::STANDARD);
        let renewed = request.renewed();
        assert_ne!(request.load_id, renewed.load_id);
        assert_eq!(request.placement, renewed.placement);
        assert_eq!(request.size, renewed.size);
    }
}
