use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use waterfall::application::mediator::Mediator;
use waterfall::application::prefetch::QueueStatus;
use waterfall::application::registry::{AdapterFactories, InitStatus};
use waterfall::domain::ad::PlacementRequest;
use waterfall::domain::format::AdFormat;
use waterfall::domain::id::{LoadId, PartnerId, PlacementId};
use waterfall::domain::metrics::{LifecycleEvent, PhaseResult};
use waterfall::error::{ErrorKind, MediationError};
use waterfall::port::outbound::auction::AuctionClient;
use waterfall::port::outbound::metrics::MetricsSink;
use waterfall::port::outbound::partner::{PartnerAdEvent, PartnerAdapter, PartnerConfig};
use waterfall::testkit::adapter::{factory, Behavior, ScriptedAdapter};
use waterfall::testkit::auction::ScriptedAuctionClient;
use waterfall::testkit::config;
use waterfall::testkit::domain::ranked_bids;
use waterfall::testkit::metrics::RecordingMetricsSink;

struct Fixture {
    mediator: Mediator,
    metrics: Arc<RecordingMetricsSink>,
    client: Arc<ScriptedAuctionClient>,
}

fn fixture(adapters: &[Arc<ScriptedAdapter>], client: ScriptedAuctionClient) -> Fixture {
    let mut factories = AdapterFactories::new();
    for adapter in adapters {
        factories.register(adapter.partner_id(), factory(adapter));
    }
    let metrics = Arc::new(RecordingMetricsSink::new());
    let client = Arc::new(client);
    let mediator = Mediator::new(
        factories,
        Arc::clone(&client) as Arc<dyn AuctionClient>,
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        config::mediator(),
    );
    Fixture {
        mediator,
        metrics,
        client,
    }
}

fn configs(partners: &[&str]) -> Vec<PartnerConfig> {
    partners.iter().map(|p| PartnerConfig::new(*p)).collect()
}

async fn ready(fixture: &Fixture, partners: &[&str]) {
    fixture
        .mediator
        .initialize(configs(partners), &HashSet::new())
        .await;
}

fn interstitial() -> PlacementRequest {
    PlacementRequest::new("inter", AdFormat::Interstitial)
}

#[tokio::test]
async fn initialization_flips_readiness_and_reports() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let beta = Arc::new(ScriptedAdapter::new("beta").with_set_up(Behavior::Fail));
    let f = fixture(&[alpha, beta], ScriptedAuctionClient::with_bids(Vec::new()));
    assert!(!f.mediator.is_ready());

    let report = f
        .mediator
        .initialize(configs(&["alpha", "beta"]), &HashSet::new())
        .await;

    assert!(f.mediator.is_ready());
    assert!(*f.mediator.ready_signal().borrow());
    assert_eq!(report.initialized().count(), 1);
    assert_eq!(
        f.mediator.registry().status(&PartnerId::from("beta")),
        Some(InitStatus::Failed)
    );

    let phases = f.metrics.phases(LifecycleEvent::Initialization);
    assert_eq!(phases.len(), 1);
    assert_eq!(phases[0].records.len(), 2);
    assert_eq!(
        phases[0].result,
        PhaseResult::PartnerFailure {
            partner: PartnerId::from("beta"),
            error: ErrorKind::PartnerInitFailed,
        }
    );
}

#[tokio::test]
async fn skipped_partner_takes_no_bids() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    let skip: HashSet<PartnerId> = [PartnerId::from("alpha")].into_iter().collect();

    f.mediator.initialize(configs(&["alpha"]), &skip).await;
    let err = f.mediator.load(interstitial()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WaterfallExhausted);
    assert_eq!(counters.set_up(), 0);
    assert_eq!(counters.network(), 0);
}

#[tokio::test]
async fn load_then_show_consumes_the_cached_ad() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    ready(&f, &["alpha"]).await;

    let ad = f.mediator.load(interstitial()).await.expect("fills");
    assert!(f.mediator.cached(&ad.load_id).is_some());

    let shown = f.mediator.show(&ad.load_id).await.expect("shows");
    assert_eq!(shown.partner, PartnerId::from("alpha"));
    assert_eq!(counters.show(), 1);
    assert!(f.mediator.cached(&ad.load_id).is_none());

    let shows = f.metrics.phases(LifecycleEvent::Show);
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].result, PhaseResult::Success);
    assert_eq!(shows[0].load_id, Some(ad.load_id));
    assert_eq!(shows[0].placement, Some(PlacementId::from("inter")));

    let again = f.mediator.show(&ad.load_id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn failed_show_is_reported_against_partner() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha").with_show(Behavior::Fail));
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    ready(&f, &["alpha"]).await;

    let ad = f.mediator.load(interstitial()).await.expect("fills");
    let err = f.mediator.show(&ad.load_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AdapterException);
    assert_eq!(
        f.metrics.phases(LifecycleEvent::Show)[0].result,
        PhaseResult::PartnerFailure {
            partner: PartnerId::from("alpha"),
            error: ErrorKind::AdapterException,
        }
    );
}

#[tokio::test]
async fn invalidate_releases_cached_ad() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    ready(&f, &["alpha"]).await;

    let ad = f.mediator.load(interstitial()).await.expect("fills");
    f.mediator.invalidate(&ad.load_id).await.expect("invalidates");

    assert_eq!(counters.invalidate(), 1);
    assert!(f.mediator.cached(&ad.load_id).is_none());
    assert_eq!(f.metrics.phases(LifecycleEvent::Invalidate).len(), 1);
}

#[tokio::test]
async fn failed_invalidate_still_drops_cached_ad() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha").with_invalidate(Behavior::Fail));
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    ready(&f, &["alpha"]).await;

    let ad = f.mediator.load(interstitial()).await.expect("fills");
    let err = f.mediator.invalidate(&ad.load_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AdapterException);
    assert!(f.mediator.cached(&ad.load_id).is_none());
    assert!(!f.metrics.phases(LifecycleEvent::Invalidate)[0].result.is_success());
}

#[tokio::test]
async fn invalidate_of_unknown_load_is_not_found() {
    let f = fixture(&[], ScriptedAuctionClient::with_bids(Vec::new()));
    let load_id = LoadId::generate();

    let err = f.mediator.invalidate(&load_id).await.unwrap_err();

    match err {
        MediationError::InvalidateNotFound { load_id: missing } => assert_eq!(missing, load_id),
        other => panic!("expected not found, got {other:?}"),
    }
    assert!(f.metrics.phases(LifecycleEvent::Invalidate).is_empty());
}

#[tokio::test]
async fn partner_expiry_evicts_cached_ad() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let f = fixture(
        &[Arc::clone(&alpha)],
        ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])),
    );
    ready(&f, &["alpha"]).await;

    let ad = f.mediator.load(interstitial()).await.expect("fills");
    assert!(alpha.emit(PartnerAdEvent::Impression));
    assert!(f.mediator.cached(&ad.load_id).is_some());

    assert!(alpha.emit(PartnerAdEvent::Expired));
    assert!(f.mediator.cached(&ad.load_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn prefetch_waits_for_initialization() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));

    let queue = f
        .mediator
        .prefetch_queue("inter", AdFormat::Interstitial, None);
    queue.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(queue.status(), QueueStatus::Paused);
    assert_eq!(f.client.calls(), 0);

    ready(&f, &["alpha"]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(queue.status(), QueueStatus::Running);
    assert_eq!(queue.len(), 1);
    assert_eq!(counters.load(), 1);

    let ad = f
        .mediator
        .load_prefetched(&PlacementId::from("inter"))
        .expect("prefetched ad");
    assert!(f.mediator.cached(&ad.load_id).is_some());
    f.mediator.show(&ad.load_id).await.expect("shows");

    f.mediator.shutdown();
    assert_eq!(queue.status(), QueueStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn partner_expiry_replaces_queued_ad() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(
        &[Arc::clone(&alpha)],
        ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])),
    );
    ready(&f, &["alpha"]).await;
    let queue = f
        .mediator
        .prefetch_queue("inter", AdFormat::Interstitial, None);
    queue.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let expired = queue.peek().map(|ad| ad.load_id).expect("queued");

    assert!(alpha.emit(PartnerAdEvent::Expired));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(queue.len(), 1);
    assert_eq!(counters.load(), 2);
    assert_eq!(counters.invalidate(), 1);
    assert_eq!(f.client.calls(), 2);
    let ad = f
        .mediator
        .load_prefetched(&PlacementId::from("inter"))
        .expect("replacement");
    assert_ne!(ad.load_id, expired);
}

#[tokio::test(start_paused = true)]
async fn invalidate_reaches_prefetched_ads() {
    let alpha = Arc::new(ScriptedAdapter::new("alpha"));
    let counters = alpha.counters();
    let f = fixture(&[alpha], ScriptedAuctionClient::with_bids(ranked_bids(&["alpha"])));
    ready(&f, &["alpha"]).await;
    let queue = f
        .mediator
        .prefetch_queue("inter", AdFormat::Interstitial, None);
    queue.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queued = queue.peek().map(|ad| ad.load_id).expect("queued");

    f.mediator.invalidate(&queued).await.expect("invalidates");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(counters.invalidate(), 1);
    assert_eq!(counters.load(), 2);
    assert_eq!(queue.len(), 1);
    assert_ne!(queue.peek().map(|ad| ad.load_id), Some(queued));
}

#[test]
fn load_prefetched_without_queue_is_none() {
    let f = fixture(&[], ScriptedAuctionClient::with_bids(Vec::new()));
    assert!(f.mediator.load_prefetched(&PlacementId::from("none")).is_none());
}
