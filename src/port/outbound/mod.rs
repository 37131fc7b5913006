//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the engine's external collaborators: partner
//! adapters, the auction server, and the metrics reporting pipeline.

pub mod auction;
pub mod metrics;
pub mod partner;
