//! Application services (use cases).
//!
//! These services drive the domain through the outbound ports. Components
//! are plain structs wired together by [`mediator::Mediator`]; none of them
//! is a global.
//!
//! # Submodules
//!
//! - [`rate_limit`] - Per-placement server cooldowns
//! - [`registry`] - Partner adapters and their initialization
//! - [`dispatch`] - Timed, isolated partner calls with metrics
//! - [`waterfall`] - Sequential load over a ranked bid set
//! - [`auction`] - Prebid, auction and waterfall for one request
//! - [`prefetch`] - Per-placement queues of pre-loaded ads
//! - [`mediator`] - Facade owning all of the above

pub mod auction;
pub mod dispatch;
pub mod mediator;
pub mod prefetch;
pub mod rate_limit;
pub mod registry;
pub mod waterfall;
