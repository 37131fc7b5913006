//! Infrastructure layer.
//!
//! Technical concerns that support the engine without containing mediation
//! logic: configuration loading, logging set-up, and wiring.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation

pub mod bootstrap;
pub mod config;
