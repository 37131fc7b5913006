//! Partner adapter port.
//!
//! Every demand partner integration implements [`PartnerAdapter`]. The engine
//! only ever talks to partners through this capability set, and always via
//! the dispatcher, which adds timeouts, error containment and metrics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    ad::PartnerAd, format::AdFormat, format::AdSize, id::LoadId, id::PartnerId,
    id::PlacementId,
};

/// Opaque partner-supplied bidding data, submitted with the auction request.
///
/// An empty map means the partner answered but does not bid on this request.
pub type BidderTokens = HashMap<String, String>;

/// Consent signals keyed by standard name (e.g. `gdpr_consent`, `us_privacy`).
pub type ConsentMap = HashMap<String, String>;

/// Error reported by a partner adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartnerError {
    #[error("no fill: {0}")]
    NoFill(String),

    #[error("unsupported ad format {0}")]
    UnsupportedFormat(AdFormat),

    #[error("partner SDK not initialized")]
    NotInitialized,

    #[error("{0}")]
    Failed(String),
}

/// Credentials and settings passed to an adapter's set-up call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerConfig {
    pub partner: PartnerId,
    pub credentials: HashMap<String, String>,
}

impl PartnerConfig {
    pub fn new(partner: impl Into<PartnerId>) -> Self {
        Self {
            partner: partner.into(),
            credentials: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }
}

/// Request for bidder tokens ahead of an auction.
#[derive(Debug, Clone, PartialEq)]
pub struct PrebidRequest {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub size: Option<AdSize>,
    pub load_id: LoadId,
}

/// Request to load the ad behind one bid.
#[derive(Debug, Clone, PartialEq)]
pub struct PartnerLoadRequest {
    pub load_id: LoadId,
    pub placement: PlacementId,
    pub partner_placement: String,
    pub format: AdFormat,
    pub size: Option<AdSize>,
    pub adm: Option<String>,
    pub partner_settings: HashMap<String, String>,
    pub keywords: HashMap<String, String>,
}

/// Asynchronous events a loaded partner ad may raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerAdEvent {
    Impression,
    Click,
    Reward,
    Dismiss,
    /// The partner expired the ad; it can no longer be shown.
    Expired,
}

/// Receiver of partner ad events.
pub trait PartnerAdListener: Send + Sync {
    fn on_event(&self, ad: &PartnerAd, event: PartnerAdEvent);
}

/// Listener that drops every event.
pub struct NullAdListener;

impl PartnerAdListener for NullAdListener {
    fn on_event(&self, _ad: &PartnerAd, _event: PartnerAdEvent) {}
}

/// Capability set of a demand partner integration.
///
/// Implementations must be thread-safe; the engine calls them concurrently
/// from spawned tasks and may abandon a call that outlives its deadline.
#[async_trait]
pub trait PartnerAdapter: Send + Sync {
    /// Partner this adapter serves.
    fn partner_id(&self) -> PartnerId;

    /// Version of the wrapped partner SDK.
    fn partner_version(&self) -> String;

    /// Version of the adapter itself.
    fn adapter_version(&self) -> String;

    /// Initialize the partner SDK.
    async fn set_up(&self, config: &PartnerConfig) -> Result<(), PartnerError>;

    /// Collect bidding data for an upcoming auction.
    async fn fetch_bidder_information(
        &self,
        request: &PrebidRequest,
    ) -> Result<BidderTokens, PartnerError>;

    /// Load the ad for one bid.
    async fn load(
        &self,
        request: &PartnerLoadRequest,
        listener: Arc<dyn PartnerAdListener>,
    ) -> Result<PartnerAd, PartnerError>;

    /// Show a previously loaded ad.
    async fn show(&self, ad: &PartnerAd) -> Result<PartnerAd, PartnerError>;

    /// Release a previously loaded ad.
    async fn invalidate(&self, ad: &PartnerAd) -> Result<(), PartnerError>;

    /// Forward privacy consent signals.
    fn set_consents(&self, consents: &ConsentMap);

    /// Forward the user's age-restriction status.
    fn set_underage(&self, underage: bool);
}
