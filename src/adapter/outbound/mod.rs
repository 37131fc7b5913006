//! Outbound adapters (driven side).

pub mod metrics;
