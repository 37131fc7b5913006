//! Infrastructure configuration modules.

pub mod engine;
pub mod logging;
pub mod partners;
pub mod settings;
pub mod timeouts;
