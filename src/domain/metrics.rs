//! Per-partner lifecycle metrics.
//!
//! A [`MetricsRecord`] is opened right before an adapter call and sealed
//! exactly once when the call completes, fails, or times out. Records from
//! one lifecycle phase are flushed together as a [`PhaseReport`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::Instant;

use super::format::{AdFormat, AdSize};
use super::id::{AuctionId, LoadId, PartnerId, PlacementId};
use crate::error::ErrorKind;

/// Adapter lifecycle stage a metric describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Initialization,
    Prebid,
    Load,
    Show,
    Invalidate,
    Expiration,
}

impl LifecycleEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::Prebid => "prebid",
            Self::Load => "load",
            Self::Show => "show",
            Self::Invalidate => "invalidate",
            Self::Expiration => "expiration",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (partner, lifecycle event) measurement.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRecord {
    pub partner: PartnerId,
    pub event: LifecycleEvent,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub success: bool,
    pub error: Option<ErrorKind>,
    pub auction_id: Option<AuctionId>,
    pub line_item_id: Option<String>,
    pub network_type: Option<String>,
    pub placement_type: Option<AdFormat>,
    pub size: Option<AdSize>,
    pub partner_version: Option<String>,
    pub adapter_version: Option<String>,
    #[serde(skip)]
    start: Instant,
    #[serde(skip)]
    sealed: bool,
}

impl MetricsRecord {
    /// Open a record; the monotonic start instant is captured now.
    #[must_use]
    pub fn start(partner: PartnerId, event: LifecycleEvent) -> Self {
        Self {
            partner,
            event,
            started_at: Utc::now(),
            ended_at: None,
            duration: None,
            success: false,
            error: None,
            auction_id: None,
            line_item_id: None,
            network_type: None,
            placement_type: None,
            size: None,
            partner_version: None,
            adapter_version: None,
            start: Instant::now(),
            sealed: false,
        }
    }

    #[must_use]
    pub fn with_auction(mut self, auction_id: Option<AuctionId>) -> Self {
        self.auction_id = auction_id;
        self
    }

    #[must_use]
    pub fn with_line_item(mut self, line_item_id: Option<String>) -> Self {
        self.line_item_id = line_item_id;
        self
    }

    #[must_use]
    pub fn with_network_type(mut self, network_type: Option<String>) -> Self {
        self.network_type = network_type;
        self
    }

    #[must_use]
    pub fn with_placement(mut self, format: AdFormat, size: Option<AdSize>) -> Self {
        self.placement_type = Some(format);
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_versions(mut self, partner_version: String, adapter_version: String) -> Self {
        self.partner_version = Some(partner_version);
        self.adapter_version = Some(adapter_version);
        self
    }

    /// Finalize the record. Only the first call has any effect.
    ///
    /// Returns `false` when the record was already sealed, which is how late
    /// results from abandoned calls are kept out of the metrics.
    pub fn seal(&mut self, outcome: Result<(), ErrorKind>) -> bool {
        if self.sealed {
            return false;
        }
        self.sealed = true;
        self.ended_at = Some(Utc::now());
        self.duration = Some(self.start.elapsed());
        match outcome {
            Ok(()) => {
                self.success = true;
                self.error = None;
            }
            Err(kind) => {
                self.success = false;
                self.error = Some(kind);
            }
        }
        true
    }

    /// Turn a sealed success into a failure of `kind`, keeping its timing.
    ///
    /// Used when a call succeeded but its result was refused afterwards.
    pub fn reject(&mut self, kind: ErrorKind) {
        if !self.sealed {
            self.seal(Err(kind));
            return;
        }
        self.success = false;
        self.error = Some(kind);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Structured classification of a flushed phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PhaseResult {
    Success,
    /// The last attempted partner failed.
    PartnerFailure { partner: PartnerId, error: ErrorKind },
    /// The phase failed before any partner was attempted.
    Failure { error: ErrorKind },
}

impl PhaseResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Records of one lifecycle phase plus phase-level aggregate fields.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: LifecycleEvent,
    pub placement: Option<PlacementId>,
    pub load_id: Option<LoadId>,
    pub auction_id: Option<AuctionId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Time spent in the phase while the host application was backgrounded.
    pub background_duration: Duration,
    pub result: PhaseResult,
    pub records: Vec<MetricsRecord>,
}

impl PhaseReport {
    /// A report for `phase` that ends now.
    pub fn new(
        phase: LifecycleEvent,
        started_at: DateTime<Utc>,
        result: PhaseResult,
        records: Vec<MetricsRecord>,
    ) -> Self {
        Self {
            phase,
            placement: None,
            load_id: None,
            auction_id: None,
            started_at,
            ended_at: Utc::now(),
            background_duration: Duration::ZERO,
            result,
            records,
        }
    }

    #[must_use]
    pub fn with_placement(mut self, placement: PlacementId) -> Self {
        self.placement = Some(placement);
        self
    }

    #[must_use]
    pub fn with_load_id(mut self, load_id: LoadId) -> Self {
        self.load_id = Some(load_id);
        self
    }

    #[must_use]
    pub fn with_auction(mut self, auction_id: Option<AuctionId>) -> Self {
        self.auction_id = auction_id;
        self
    }
}

/// Auction winner notice, reported once per successful load.
#[derive(Debug, Clone, Serialize)]
pub struct WinnerEvent {
    pub auction_id: AuctionId,
    pub load_id: LoadId,
    pub placement: PlacementId,
    pub partner: PartnerId,
    pub line_item_id: Option<String>,
    pub price: Decimal,
}
