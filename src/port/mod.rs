//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points of the engine. They are traits that
//! adapters implement to integrate with external systems.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     │                         │                             │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │ Partner │            │   Auction   │              │  Metrics  │
//! │ Adapter │            │   Client    │              │   Sink    │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`outbound::partner::PartnerAdapter`] - Demand partner integration
//! - [`outbound::auction::AuctionClient`] - Auction server
//! - [`outbound::metrics::MetricsSink`] - Off-device metrics reporting

pub mod outbound;
