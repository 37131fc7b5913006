//! Partner-agnostic domain types.
//!
//! Nothing in here talks to partners or the auction server; these are the
//! values the engine passes between ports.

pub mod ad;
pub mod bid;
pub mod format;
pub mod id;
pub mod metrics;
