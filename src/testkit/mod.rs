//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`adapter`] - `ScriptedAdapter`, a partner adapter with scripted outcomes.
//! - [`auction`] - `ScriptedAuctionClient`, canned auction responses.
//! - [`metrics`] - `RecordingMetricsSink`, keeps reported events in memory.
//! - [`loader`] - `ScriptedLoader`, an `AdLoader` for prefetch tests.
//! - [`domain`] - Builders for bids, requests and loaded ads.
//! - [`config`] - Canonical test configurations.

pub mod adapter;
pub mod auction;
pub mod config;
pub mod domain;
pub mod loader;
pub mod metrics;
