//! Wiring helpers shared by the integration tests.

use std::sync::Arc;

use waterfall::application::auction::AuctionOrchestrator;
use waterfall::application::dispatch::PartnerDispatcher;
use waterfall::application::rate_limit::RateLimiter;
use waterfall::application::waterfall::{WaterfallConfig, WaterfallLoader};
use waterfall::port::outbound::auction::AuctionClient;
use waterfall::port::outbound::metrics::MetricsSink;
use waterfall::port::outbound::partner::{NullAdListener, PartnerAdapter};
use waterfall::testkit::adapter::ScriptedAdapter;
use waterfall::testkit::auction::ScriptedAuctionClient;
use waterfall::testkit::config;
use waterfall::testkit::domain::registry_with;
use waterfall::testkit::metrics::RecordingMetricsSink;

/// Dispatcher over adapters that are already routable.
pub fn dispatcher(adapters: &[Arc<ScriptedAdapter>]) -> Arc<PartnerDispatcher> {
    let adapters = adapters
        .iter()
        .map(|adapter| Arc::clone(adapter) as Arc<dyn PartnerAdapter>)
        .collect();
    Arc::new(PartnerDispatcher::new(registry_with(adapters)))
}

pub fn loader_over(adapters: &[Arc<ScriptedAdapter>], config: WaterfallConfig) -> WaterfallLoader {
    WaterfallLoader::new(dispatcher(adapters), config)
}

/// An orchestrator plus handles on everything it reports to.
pub struct Harness {
    pub orchestrator: AuctionOrchestrator,
    pub client: Arc<ScriptedAuctionClient>,
    pub metrics: Arc<RecordingMetricsSink>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub fn harness(adapters: &[Arc<ScriptedAdapter>], client: ScriptedAuctionClient) -> Harness {
    harness_with(adapters, client, true)
}

pub fn harness_with(
    adapters: &[Arc<ScriptedAdapter>],
    client: ScriptedAuctionClient,
    enforce_rate_limit: bool,
) -> Harness {
    let dispatcher = dispatcher(adapters);
    let client = Arc::new(client);
    let metrics = Arc::new(RecordingMetricsSink::new());
    let rate_limiter = Arc::new(RateLimiter::new());
    let mut auction = config::auction();
    auction.enforce_rate_limit = enforce_rate_limit;

    let orchestrator = AuctionOrchestrator::new(
        Arc::clone(&dispatcher),
        Arc::clone(&rate_limiter),
        Arc::clone(&client) as Arc<dyn AuctionClient>,
        WaterfallLoader::new(dispatcher, config::waterfall(true)),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        Arc::new(NullAdListener),
        auction,
    );

    Harness {
        orchestrator,
        client,
        metrics,
        rate_limiter,
    }
}
