//! Waterfall - ad mediation engine.
//!
//! Runs real-time auctions across demand partners and loads the winning ad
//! through a sequential waterfall, with per-placement rate limiting and
//! prefetch queues that keep ads warm ahead of demand.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **`domain`** - Bids, ad formats, identifiers and lifecycle metrics
//! - **`port`** - Traits for partner adapters, the auction server and metrics
//! - **`application`** - The engine: registry, dispatcher, waterfall,
//!   auction orchestrator, prefetch queues and the [`Mediator`] facade
//! - **`adapter`** - Port implementations shipped with the crate
//! - **`infrastructure`** - Configuration, logging and wiring
//!
//! # Modules
//!
//! - [`domain`] - Pure types, no I/O
//! - [`error`] - Error kinds and error types for the crate
//! - [`port`] - Extension points
//! - [`application`] - Use cases
//! - [`adapter`] - Outbound adapters
//! - [`infrastructure`] - Config loading and the composition root
//!
//! # Features
//!
//! - `testkit` - Scripted adapters, auction clients and sinks for tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use waterfall::application::registry::AdapterFactories;
//! use waterfall::infrastructure::bootstrap;
//! use waterfall::infrastructure::config::settings::Config;
//! use waterfall::port::outbound::auction::AuctionClient;
//!
//! async fn run(client: Arc<dyn AuctionClient>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("mediation.toml")?;
//!     config.init_logging();
//!     let (mediator, report) =
//!         bootstrap::start(&config, AdapterFactories::new(), client, Vec::new()).await;
//!     println!("{} partners ready", report.initialized().count());
//!     mediator.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! [`Mediator`]: application::mediator::Mediator

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
