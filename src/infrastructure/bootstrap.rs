//! Composition root: builds a ready-to-initialize [`Mediator`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter::outbound::metrics::LogMetricsSink;
use crate::application::mediator::Mediator;
use crate::application::registry::{AdapterFactories, InitializationReport};
use crate::infrastructure::config::settings::Config;
use crate::port::outbound::auction::AuctionClient;
use crate::port::outbound::metrics::{MetricsSink, MetricsSinkRegistry};

/// Build the metrics sink registry.
///
/// The log sink is always present; `extra` sinks are appended after it.
pub fn build_metrics_sink(extra: Vec<Box<dyn MetricsSink>>) -> MetricsSinkRegistry {
    let mut registry = MetricsSinkRegistry::new();
    registry.register(Box::new(LogMetricsSink));
    for sink in extra {
        registry.register(sink);
    }
    registry
}

/// Wire a mediator from configuration.
///
/// Partners named in `config` still need a factory in `factories`; one
/// without is reported as failed during initialization.
pub fn build_mediator(
    config: &Config,
    factories: AdapterFactories,
    auction_client: Arc<dyn AuctionClient>,
    metrics: Vec<Box<dyn MetricsSink>>,
) -> Mediator {
    let sink = build_metrics_sink(metrics);
    for partner in &config.partners {
        let id = partner.partner_id();
        if !partner.skip && !factories.contains(&id) {
            warn!(partner = %id, "Configured partner has no adapter factory");
        }
    }
    info!(
        partners = config.partners.len(),
        factories = factories.len(),
        sinks = sink.len(),
        "Building mediator"
    );
    Mediator::new(
        factories,
        auction_client,
        Arc::new(sink),
        config.mediator_settings(),
    )
}

/// Build a mediator and initialize every configured partner.
pub async fn start(
    config: &Config,
    factories: AdapterFactories,
    auction_client: Arc<dyn AuctionClient>,
    metrics: Vec<Box<dyn MetricsSink>>,
) -> (Mediator, InitializationReport) {
    let mediator = build_mediator(config, factories, auction_client, metrics);
    let report = mediator
        .initialize(config.partner_configs(), &config.skipped_partners())
        .await;
    (mediator, report)
}
