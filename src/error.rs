//! Error types for the crate.
//!
//! Engine operations fail with [`MediationError`], whose [`kind`](MediationError::kind)
//! is a stable [`ErrorKind`] suitable for support diagnostics. Configuration
//! loading fails with [`ConfigError`]. [`Error`] wraps both for callers that
//! only want one type.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{
    format::AdSize, id::LoadId, id::PartnerId, id::PlacementId, metrics::LifecycleEvent,
};

/// Upper bound on diagnostic payloads attached to malformed-response errors.
pub const MAX_DIAGNOSTIC_PAYLOAD_CHARS: usize = 1000;

/// Stable, machine-readable classification of every terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    InvalidRequest,
    AuctionNetworkError,
    AuctionMalformedResponse,
    AuctionNoBid,
    AdapterNotFound,
    AdapterTimeout,
    AdapterException,
    OversizedCreative,
    PartnerInitFailed,
    WaterfallExhausted,
    InvalidateNotFound,
}

impl ErrorKind {
    /// Stable code used in logs and metrics payloads.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::AuctionNetworkError => "auction_network_error",
            Self::AuctionMalformedResponse => "auction_malformed_response",
            Self::AuctionNoBid => "auction_no_bid",
            Self::AdapterNotFound => "adapter_not_found",
            Self::AdapterTimeout => "adapter_timeout",
            Self::AdapterException => "adapter_exception",
            Self::OversizedCreative => "oversized_creative",
            Self::PartnerInitFailed => "partner_init_failed",
            Self::WaterfallExhausted => "waterfall_exhausted",
            Self::InvalidateNotFound => "invalidate_not_found",
        }
    }

    /// Human-readable cause.
    #[must_use]
    pub const fn cause(self) -> &'static str {
        match self {
            Self::RateLimited => "Too many requests were made for this placement.",
            Self::InvalidRequest => "The ad request failed validation.",
            Self::AuctionNetworkError => "The auction request could not reach the server.",
            Self::AuctionMalformedResponse => "The auction server returned an unreadable response.",
            Self::AuctionNoBid => "No demand partner bid on this request.",
            Self::AdapterNotFound => "No adapter is registered for the winning partner.",
            Self::AdapterTimeout => "The partner did not answer before its deadline.",
            Self::AdapterException => "The partner adapter reported an error.",
            Self::OversizedCreative => "The partner returned a creative larger than requested.",
            Self::PartnerInitFailed => "The partner adapter failed to initialize.",
            Self::WaterfallExhausted => "Every bid in the waterfall failed to load.",
            Self::InvalidateNotFound => "There is no cached ad to invalidate.",
        }
    }

    /// Suggested resolution.
    #[must_use]
    pub const fn resolution(self) -> &'static str {
        match self {
            Self::RateLimited => "Wait for the cooldown to expire before requesting again.",
            Self::InvalidRequest => "Check the placement, format, and banner size of the request.",
            Self::AuctionNetworkError => "Check network connectivity and retry.",
            Self::AuctionMalformedResponse => "Report the attached payload to the mediation server team.",
            Self::AuctionNoBid => "Retry later; fill depends on available demand.",
            Self::AdapterNotFound => "Make sure the partner adapter is linked and initialized.",
            Self::AdapterTimeout => "Retry; persistent timeouts point to partner SDK issues.",
            Self::AdapterException => "Inspect the partner error for details.",
            Self::OversizedCreative => "Report the line item; the partner ignores size constraints.",
            Self::PartnerInitFailed => "Verify the partner credentials in the configuration.",
            Self::WaterfallExhausted => "Retry later; no partner could fill this request.",
            Self::InvalidateNotFound => "Only invalidate ads returned by a successful load.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal failure of a mediation operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediationError {
    #[error("placement {placement} is rate limited for another {remaining_ms}ms")]
    RateLimited {
        placement: PlacementId,
        remaining_ms: u64,
    },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("auction request failed: {reason}")]
    AuctionNetwork { reason: String },

    #[error("auction response malformed: {reason}")]
    AuctionMalformed {
        reason: String,
        /// Raw payload, capped at [`MAX_DIAGNOSTIC_PAYLOAD_CHARS`].
        payload: String,
    },

    #[error("auction returned no bids for placement {placement}")]
    AuctionNoBid { placement: PlacementId },

    #[error("no adapter available for partner {partner}")]
    AdapterNotFound { partner: PartnerId },

    #[error("partner {partner} timed out after {}ms during {operation}", timeout.as_millis())]
    AdapterTimeout {
        partner: PartnerId,
        operation: LifecycleEvent,
        timeout: Duration,
    },

    #[error("partner {partner} failed during {operation}: {reason}")]
    AdapterException {
        partner: PartnerId,
        operation: LifecycleEvent,
        reason: String,
    },

    #[error("partner {partner} returned a {actual} creative for a {requested} request")]
    OversizedCreative {
        partner: PartnerId,
        requested: AdSize,
        actual: AdSize,
    },

    #[error("partner {partner} failed to initialize: {reason}")]
    PartnerInitFailed { partner: PartnerId, reason: String },

    #[error("waterfall exhausted after {attempts} load attempts")]
    WaterfallExhausted { attempts: usize },

    #[error("no cached ad for load {load_id}")]
    InvalidateNotFound { load_id: LoadId },
}

impl MediationError {
    /// Build a malformed-response error, capping the diagnostic payload.
    pub fn malformed(reason: impl Into<String>, payload: &str) -> Self {
        Self::AuctionMalformed {
            reason: reason.into(),
            payload: truncate_payload(payload),
        }
    }

    /// The stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::AuctionNetwork { .. } => ErrorKind::AuctionNetworkError,
            Self::AuctionMalformed { .. } => ErrorKind::AuctionMalformedResponse,
            Self::AuctionNoBid { .. } => ErrorKind::AuctionNoBid,
            Self::AdapterNotFound { .. } => ErrorKind::AdapterNotFound,
            Self::AdapterTimeout { .. } => ErrorKind::AdapterTimeout,
            Self::AdapterException { .. } => ErrorKind::AdapterException,
            Self::OversizedCreative { .. } => ErrorKind::OversizedCreative,
            Self::PartnerInitFailed { .. } => ErrorKind::PartnerInitFailed,
            Self::WaterfallExhausted { .. } => ErrorKind::WaterfallExhausted,
            Self::InvalidateNotFound { .. } => ErrorKind::InvalidateNotFound,
        }
    }

    /// The partner this failure is attributed to, if any.
    #[must_use]
    pub const fn partner(&self) -> Option<&PartnerId> {
        match self {
            Self::AdapterNotFound { partner }
            | Self::AdapterTimeout { partner, .. }
            | Self::AdapterException { partner, .. }
            | Self::OversizedCreative { partner, .. }
            | Self::PartnerInitFailed { partner, .. } => Some(partner),
            _ => None,
        }
    }
}

/// Cap a diagnostic payload at [`MAX_DIAGNOSTIC_PAYLOAD_CHARS`] characters.
#[must_use]
pub fn truncate_payload(payload: &str) -> String {
    match payload.char_indices().nth(MAX_DIAGNOSTIC_PAYLOAD_CHARS) {
        Some((end, _)) => payload[..end].to_string(),
        None => payload.to_string(),
    }
}

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mediation(#[from] MediationError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_payload_caps_long_input() {
        let payload = "x".repeat(MAX_DIAGNOSTIC_PAYLOAD_CHARS + 500);
        assert_eq!(truncate_payload(&payload).len(), MAX_DIAGNOSTIC_PAYLOAD_CHARS);
    }

    #[test]
    fn truncate_payload_respects_char_boundaries() {
        let payload = "é".repeat(MAX_DIAGNOSTIC_PAYLOAD_CHARS + 1);
        let truncated = truncate_payload(&payload);
        assert_eq!(truncated.chars().count(), MAX_DIAGNOSTIC_PAYLOAD_CHARS);
    }

    #[test]
    fn short_payload_is_unchanged() {
        assert_eq!(truncate_payload("{\"bad\":"), "{\"bad\":");
    }

    #[test]
    fn malformed_constructor_truncates() {
        let err = MediationError::malformed("bad json", &"y".repeat(5000));
        match err {
            MediationError::AuctionMalformed { payload, .. } => {
                assert_eq!(payload.len(), MAX_DIAGNOSTIC_PAYLOAD_CHARS);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn kinds_map_to_stable_codes() {
        let err = MediationError::WaterfallExhausted { attempts: 3 };
        assert_eq!(err.kind(), ErrorKind::WaterfallExhausted);
        assert_eq!(err.kind().code(), "waterfall_exhausted");
        assert!(!err.kind().cause().is_empty());
        assert!(!err.kind().resolution().is_empty());
    }

    #[test]
    fn partner_attribution() {
        let err = MediationError::AdapterNotFound {
            partner: PartnerId::from("alpha"),
        };
        assert_eq!(err.partner().map(PartnerId::as_str), Some("alpha"));
        assert!(MediationError::WaterfallExhausted { attempts: 0 }
            .partner()
            .is_none());
    }
}
