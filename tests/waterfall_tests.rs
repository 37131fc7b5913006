mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};

use support::engine::loader_over;
use waterfall::application::waterfall::LoadContext;
use waterfall::domain::ad::PlacementRequest;
use waterfall::domain::format::{AdFormat, AdSize};
use waterfall::domain::id::PartnerId;
use waterfall::domain::metrics::LifecycleEvent;
use waterfall::error::{ErrorKind, MediationError};
use waterfall::port::outbound::partner::NullAdListener;
use waterfall::testkit::adapter::{attempt_log, Behavior, ScriptedAdapter};
use waterfall::testkit::config;
use waterfall::testkit::domain::{bid, bid_set, ranked_bids};

fn context(request: PlacementRequest) -> LoadContext {
    LoadContext::new(request, Arc::new(NullAdListener))
}

fn interstitial() -> LoadContext {
    context(PlacementRequest::new("p", AdFormat::Interstitial))
}

fn ids(partners: &[&str]) -> Vec<PartnerId> {
    partners.iter().map(|p| PartnerId::from(*p)).collect()
}

fn ilrd(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn attempts_in_rank_order_until_first_fill() {
    let log = attempt_log();
    let adapters = vec![
        Arc::new(ScriptedAdapter::new("a").with_load(Behavior::Fail).with_attempt_log(log.clone())),
        Arc::new(ScriptedAdapter::new("b").with_load(Behavior::Fail).with_attempt_log(log.clone())),
        Arc::new(ScriptedAdapter::new("c").with_attempt_log(log.clone())),
        Arc::new(ScriptedAdapter::new("d").with_attempt_log(log.clone())),
    ];
    let loader = loader_over(&adapters, config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["a", "b", "c", "d"]));

    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    let ad = outcome.result.expect("third bid fills");
    assert_eq!(ad.partner(), &PartnerId::from("c"));
    assert_eq!(*log.lock(), ids(&["a", "b", "c"]));
    assert_eq!(adapters[3].counters().load(), 0);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(
        outcome.records.iter().map(|r| r.success).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert_eq!(bids.active_bid_index(), 2);
}

#[tokio::test]
async fn server_order_is_reranked_by_price() {
    let log = attempt_log();
    let adapters = vec![
        Arc::new(ScriptedAdapter::new("cheap").with_load(Behavior::Fail).with_attempt_log(log.clone())),
        Arc::new(ScriptedAdapter::new("rich").with_load(Behavior::Fail).with_attempt_log(log.clone())),
    ];
    let loader = loader_over(&adapters, config::waterfall(true));
    let mut bids = bid_set(vec![bid("cheap", dec!(0.5)), bid("rich", dec!(4.0))]);

    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    assert!(outcome.result.is_err());
    assert_eq!(*log.lock(), ids(&["rich", "cheap"]));
}

#[tokio::test]
async fn empty_bid_set_is_exhausted_without_attempts() {
    let loader = loader_over(&[], config::waterfall(true));
    let mut bids = bid_set(Vec::new());

    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    match outcome.result {
        Err(MediationError::WaterfallExhausted { attempts }) => assert_eq!(attempts, 0),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(outcome.records.is_empty());
    assert!(outcome.last_failure.is_none());
}

#[tokio::test]
async fn all_failures_exhaust_and_keep_last_failure() {
    let adapters = vec![
        Arc::new(ScriptedAdapter::new("a").with_load(Behavior::Fail)),
        Arc::new(ScriptedAdapter::new("b").with_load(Behavior::Panic)),
    ];
    let loader = loader_over(&adapters, config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["a", "b"]));

    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    assert_eq!(
        outcome.result.as_ref().err().map(MediationError::kind),
        Some(ErrorKind::WaterfallExhausted)
    );
    let (partner, error) = outcome.last_failure.expect("last failure recorded");
    assert_eq!(partner, PartnerId::from("b"));
    assert_eq!(error.kind(), ErrorKind::AdapterException);
    assert!(bids.is_exhausted());
}

#[tokio::test]
async fn bid_for_unregistered_partner_is_skipped() {
    let adapters = vec![Arc::new(ScriptedAdapter::new("known"))];
    let loader = loader_over(&adapters, config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["ghost", "known"]));

    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    assert_eq!(outcome.result.expect("fills").partner(), &PartnerId::from("known"));
    assert_eq!(outcome.records[0].error, Some(ErrorKind::AdapterNotFound));
}

#[tokio::test(start_paused = true)]
async fn hanging_load_times_out_and_moves_on() {
    let adapters = vec![
        Arc::new(ScriptedAdapter::new("slow").with_load(Behavior::Hang)),
        Arc::new(ScriptedAdapter::new("fast")),
    ];
    let loader = loader_over(&adapters, config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["slow", "fast"]));

    let started = tokio::time::Instant::now();
    let outcome = loader.load_waterfall(&mut bids, &interstitial()).await;

    assert_eq!(outcome.result.expect("fills").partner(), &PartnerId::from("fast"));
    assert_eq!(outcome.records[0].error, Some(ErrorKind::AdapterTimeout));
    assert!(started.elapsed() >= config::LOAD_TIMEOUT);
    assert!(started.elapsed() < config::LOAD_TIMEOUT + Duration::from_secs(1));
}

fn adaptive(size: AdSize) -> LoadContext {
    context(PlacementRequest::new("p", AdFormat::AdaptiveBanner).with_size(size))
}

#[tokio::test]
async fn oversized_adaptive_banner_is_rejected_and_invalidated() {
    let big = Arc::new(ScriptedAdapter::new("big").with_reported_size(AdSize::new(400, 50)));
    let fits = Arc::new(ScriptedAdapter::new("fits").with_reported_size(AdSize::new(320, 50)));
    let big_counters = big.counters();
    let loader = loader_over(&[big, fits], config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["big", "fits"]));

    let outcome = loader
        .load_waterfall(&mut bids, &adaptive(AdSize::new(320, 50)))
        .await;

    assert_eq!(outcome.result.expect("fills").partner(), &PartnerId::from("fits"));
    assert_eq!(big_counters.invalidate(), 1);
    assert_eq!(outcome.records.len(), 3);
    let rejected = &outcome.records[0];
    assert!(!rejected.success);
    assert_eq!(rejected.error, Some(ErrorKind::OversizedCreative));
    let invalidated = &outcome.records[1];
    assert_eq!(invalidated.event, LifecycleEvent::Invalidate);
    assert_eq!(invalidated.partner, PartnerId::from("big"));
    assert!(invalidated.success);
    assert_eq!(outcome.records[2].partner, PartnerId::from("fits"));
}

#[tokio::test]
async fn oversized_banner_is_kept_when_check_disabled() {
    let big = Arc::new(ScriptedAdapter::new("big").with_reported_size(AdSize::new(400, 50)));
    let loader = loader_over(&[big], config::waterfall(false));
    let mut bids = bid_set(ranked_bids(&["big"]));

    let outcome = loader
        .load_waterfall(&mut bids, &adaptive(AdSize::new(320, 50)))
        .await;

    assert_eq!(outcome.result.expect("fills").partner(), &PartnerId::from("big"));
}

#[tokio::test]
async fn banner_without_reported_dimensions_is_accepted() {
    let quiet = Arc::new(ScriptedAdapter::new("quiet"));
    let loader = loader_over(&[quiet], config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["quiet"]));

    let outcome = loader
        .load_waterfall(&mut bids, &adaptive(AdSize::new(320, 50)))
        .await;

    assert!(outcome.result.is_ok());
}

#[tokio::test]
async fn zero_requested_height_leaves_height_unconstrained() {
    let tall = Arc::new(ScriptedAdapter::new("tall").with_reported_size(AdSize::new(320, 250)));
    let loader = loader_over(&[tall], config::waterfall(true));
    let mut bids = bid_set(ranked_bids(&["tall"]));

    let outcome = loader
        .load_waterfall(&mut bids, &adaptive(AdSize::new(320, 0)))
        .await;

    assert!(outcome.result.is_ok());
}

#[tokio::test]
async fn partner_ilrd_is_merged_into_winning_bid() {
    let winner = Arc::new(
        ScriptedAdapter::new("w").with_ilrd(ilrd(json!({ "revenue": 0.02, "network": "w-net" }))),
    );
    let loader = loader_over(&[winner], config::waterfall(true));
    let mut bids = bid_set(vec![
        bid("w", dec!(2.0)).with_ilrd(ilrd(json!({ "network": "server", "country": "US" }))),
    ]);

    let ad = loader
        .load_waterfall(&mut bids, &interstitial())
        .await
        .result
        .expect("fills");

    let merged = ad.bid.ilrd().expect("ilrd present");
    assert_eq!(merged["network"], json!("w-net"));
    assert_eq!(merged["country"], json!("US"));
    assert_eq!(merged["revenue"], json!(0.02));
}
