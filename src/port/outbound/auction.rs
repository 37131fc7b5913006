//! Auction server port.
//!
//! The auction server turns a placement request plus the collected bidder
//! tokens into a ranked list of bids. Request construction and wire format
//! belong to the implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    bid::Bid, format::AdFormat, format::AdSize, id::AuctionId, id::LoadId, id::PartnerId,
    id::PlacementId,
};
use crate::error::MediationError;

use super::partner::BidderTokens;

/// Response header carrying the server-specified cooldown, in seconds.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-mediation-ratelimit-reset";

/// Header name older servers use for the same cooldown.
pub const LEGACY_RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Everything the auction server needs for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRequest {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub size: Option<AdSize>,
    pub load_id: LoadId,
    pub keywords: HashMap<String, String>,
    /// Tokens from every partner that answered the prebid fan-out.
    pub bidder_tokens: HashMap<PartnerId, BidderTokens>,
    /// Cooldown currently applied to this placement, in seconds.
    pub rate_limit_secs: u64,
}

/// Successful auction response.
#[derive(Debug, Clone, Default)]
pub struct AuctionResponse {
    pub auction_id: Option<AuctionId>,
    pub bids: Vec<Bid>,
    pub headers: HashMap<String, String>,
}

impl AuctionResponse {
    /// Server-specified cooldown, preferring the current header over the legacy one.
    ///
    /// Header names match case-insensitively; unparsable values are ignored.
    pub fn rate_limit_reset_secs(&self) -> Option<u64> {
        self.header_secs(RATE_LIMIT_RESET_HEADER)
            .or_else(|| self.header_secs(LEGACY_RATE_LIMIT_RESET_HEADER))
    }

    fn header_secs(&self, name: &str) -> Option<u64> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.trim().parse().ok())
    }
}

/// Structured auction failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {reason}")]
    Malformed { reason: String, payload: String },

    #[error("no bid")]
    NoBid,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
}

impl AuctionError {
    /// Convert into the engine's terminal error for `placement`.
    pub fn into_mediation(self, placement: &PlacementId) -> MediationError {
        match self {
            Self::Network(reason) => MediationError::AuctionNetwork { reason },
            Self::Malformed { reason, payload } => MediationError::malformed(reason, &payload),
            Self::NoBid => MediationError::AuctionNoBid {
                placement: placement.clone(),
            },
            Self::RateLimited { retry_after_secs } => MediationError::RateLimited {
                placement: placement.clone(),
                remaining_ms: retry_after_secs.unwrap_or(0).saturating_mul(1000),
            },
        }
    }
}

/// Client for the auction server.
#[async_trait]
pub trait AuctionClient: Send + Sync {
    /// Run the auction for a request.
    async fn fetch_bids(&self, request: &AuctionRequest) -> Result<AuctionResponse, AuctionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, MAX_DIAGNOSTIC_PAYLOAD_CHARS};

    fn response_with(headers: &[(&str, &str)]) -> AuctionResponse {
        AuctionResponse {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn prefers_current_header() {
        let response = response_with(&[
            (LEGACY_RATE_LIMIT_RESET_HEADER, "10"),
            (RATE_LIMIT_RESET_HEADER, "30"),
        ]);
        assert_eq!(response.rate_limit_reset_secs(), Some(30));
    }

    #[test]
    fn falls_back_to_legacy_header() {
        let response = response_with(&[("X-RateLimit-Reset", "15")]);
        assert_eq!(response.rate_limit_reset_secs(), Some(15));
    }

    #[test]
    fn ignores_unparsable_header() {
        let response = response_with(&[(RATE_LIMIT_RESET_HEADER, "soon")]);
        assert_eq!(response.rate_limit_reset_secs(), None);
    }

    #[test]
    fn malformed_conversion_caps_payload() {
        let err = AuctionError::Malformed {
            reason: "unexpected token".into(),
            payload: "z".repeat(MAX_DIAGNOSTIC_PAYLOAD_CHARS * 3),
        }
        .into_mediation(&PlacementId::from("p"));

        assert_eq!(err.kind(), ErrorKind::AuctionMalformedResponse);
        match err {
            MediationError::AuctionMalformed { payload, .. } => {
                assert_eq!(payload.len(), MAX_DIAGNOSTIC_PAYLOAD_CHARS);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn failure_kinds_are_distinct() {
        let placement = PlacementId::from("p");
        let kinds = [
            AuctionError::Network("down".into()).into_mediation(&placement).kind(),
            AuctionError::NoBid.into_mediation(&placement).kind(),
            AuctionError::RateLimited { retry_after_secs: Some(5) }
                .into_mediation(&placement)
                .kind(),
        ];
        assert_eq!(
            kinds,
            [ErrorKind::AuctionNetworkError, ErrorKind::AuctionNoBid, ErrorKind::RateLimited]
        );
    }
}
