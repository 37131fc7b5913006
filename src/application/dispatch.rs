//! Timed, isolated partner calls.
//!
//! Every adapter call runs on its own task under a hard deadline. When the
//! deadline fires the task is left running and its result, if it ever
//! arrives, is dropped; partner SDKs rarely offer a cancellation hook. Errors
//! and panics are converted to [`MediationError`] here and never unwind
//! into the caller.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::domain::ad::PartnerAd;
use crate::domain::format::{AdFormat, AdSize};
use crate::domain::id::{AuctionId, PartnerId};
use crate::domain::metrics::{LifecycleEvent, MetricsRecord};
use crate::error::MediationError;
use crate::port::outbound::partner::{
    BidderTokens, PartnerAdListener, PartnerAdapter, PartnerError, PartnerLoadRequest,
    PrebidRequest,
};

use super::registry::AdapterRegistry;

/// How a detached partner call ended.
#[derive(Debug)]
pub(crate) enum CallOutcome<T> {
    Completed(Result<T, PartnerError>),
    Panicked(String),
    TimedOut,
}

/// Run `call` on its own task and wait at most `timeout` for it.
///
/// On timeout the task is detached, not aborted.
pub(crate) async fn call_detached<T>(
    call: BoxFuture<'static, Result<T, PartnerError>>,
    timeout: Duration,
) -> CallOutcome<T>
where
    T: Send + 'static,
{
    let handle = tokio::spawn(call);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => CallOutcome::Completed(result),
        Ok(Err(join_error)) => CallOutcome::Panicked(join_error_message(join_error)),
        Err(_) => CallOutcome::TimedOut,
    }
}

fn join_error_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Contextual fields stamped onto dispatch metrics.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub auction_id: Option<AuctionId>,
    pub line_item_id: Option<String>,
    pub format: Option<AdFormat>,
    pub size: Option<AdSize>,
    pub network_type: Option<String>,
}

impl DispatchContext {
    fn open_record(&self, partner: &PartnerId, event: LifecycleEvent) -> MetricsRecord {
        let record = MetricsRecord::start(partner.clone(), event)
            .with_auction(self.auction_id.clone())
            .with_line_item(self.line_item_id.clone())
            .with_network_type(self.network_type.clone());
        match self.format {
            Some(format) => record.with_placement(format, self.size),
            None => record,
        }
    }
}

/// Tokens gathered by a prebid fan-out.
#[derive(Debug, Clone, Default)]
pub struct BidderTokenCollection {
    /// Every partner that answered, including those with an empty token.
    pub tokens: HashMap<PartnerId, BidderTokens>,
    /// One record per partner asked, failures included.
    pub records: Vec<MetricsRecord>,
}

/// Issues single partner operations through the registry.
pub struct PartnerDispatcher {
    registry: Arc<AdapterRegistry>,
}

impl PartnerDispatcher {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    async fn dispatch<T, F>(
        &self,
        partner: &PartnerId,
        event: LifecycleEvent,
        timeout: Duration,
        context: &DispatchContext,
        call: F,
    ) -> (Result<T, MediationError>, MetricsRecord)
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn PartnerAdapter>) -> BoxFuture<'static, Result<T, PartnerError>>,
    {
        let mut record = context.open_record(partner, event);

        let (adapter, versions) = match self.registry.route(partner) {
            Ok(route) => route,
            Err(e) => {
                record.seal(Err(e.kind()));
                return (Err(e), record);
            }
        };
        record = record.with_versions(versions.partner, versions.adapter);

        let result = match call_detached(call(adapter), timeout).await {
            CallOutcome::Completed(Ok(value)) => Ok(value),
            CallOutcome::Completed(Err(e)) => Err(MediationError::AdapterException {
                partner: partner.clone(),
                operation: event,
                reason: e.to_string(),
            }),
            CallOutcome::Panicked(message) => Err(MediationError::AdapterException {
                partner: partner.clone(),
                operation: event,
                reason: format!("adapter panicked: {message}"),
            }),
            CallOutcome::TimedOut => Err(MediationError::AdapterTimeout {
                partner: partner.clone(),
                operation: event,
                timeout,
            }),
        };

        record.seal(result.as_ref().map(|_| ()).map_err(MediationError::kind));

        match &result {
            Ok(_) => debug!(
                partner = %partner,
                operation = %event,
                elapsed = ?record.duration,
                "Partner call succeeded"
            ),
            Err(e) => warn!(
                partner = %partner,
                operation = %event,
                error = %e,
                "Partner call failed"
            ),
        }

        (result, record)
    }

    /// Fetch bidder tokens from one partner.
    ///
    /// An empty token map is a success: the partner simply does not bid.
    pub async fn fetch_bidder_tokens(
        &self,
        partner: &PartnerId,
        request: &PrebidRequest,
        timeout: Duration,
    ) -> (Result<BidderTokens, MediationError>, MetricsRecord) {
        let context = DispatchContext {
            format: Some(request.format),
            size: request.size,
            ..Default::default()
        };
        let request = request.clone();
        self.dispatch(partner, LifecycleEvent::Prebid, timeout, &context, move |adapter| {
            Box::pin(async move { adapter.fetch_bidder_information(&request).await })
        })
        .await
    }

    /// Ask every routable partner for bidder tokens concurrently.
    ///
    /// A partner that fails or times out contributes no token and never
    /// affects its siblings.
    pub async fn fetch_all_bidder_tokens(
        &self,
        request: &PrebidRequest,
        timeout: Duration,
    ) -> BidderTokenCollection {
        let partners = self.registry.routable_partners();
        let calls = partners
            .iter()
            .map(|partner| self.fetch_bidder_tokens(partner, request, timeout));
        let results = join_all(calls).await;

        let mut collection = BidderTokenCollection::default();
        for (partner, (result, record)) in partners.into_iter().zip(results) {
            if let Ok(tokens) = result {
                collection.tokens.insert(partner, tokens);
            }
            collection.records.push(record);
        }

        debug!(
            asked = collection.records.len(),
            answered = collection.tokens.len(),
            "Bidder token fan-out complete"
        );

        collection
    }

    /// Load the ad behind one bid.
    pub async fn load(
        &self,
        partner: &PartnerId,
        request: PartnerLoadRequest,
        listener: Arc<dyn PartnerAdListener>,
        timeout: Duration,
        context: &DispatchContext,
    ) -> (Result<PartnerAd, MediationError>, MetricsRecord) {
        self.dispatch(partner, LifecycleEvent::Load, timeout, context, move |adapter| {
            Box::pin(async move { adapter.load(&request, listener).await })
        })
        .await
    }

    /// Show a loaded ad on its partner.
    pub async fn show(
        &self,
        ad: &PartnerAd,
        timeout: Duration,
        context: &DispatchContext,
    ) -> (Result<PartnerAd, MediationError>, MetricsRecord) {
        let ad = ad.clone();
        let partner = ad.partner.clone();
        self.dispatch(&partner, LifecycleEvent::Show, timeout, context, move |adapter| {
            Box::pin(async move { adapter.show(&ad).await })
        })
        .await
    }

    /// Release a loaded ad on its partner.
    pub async fn invalidate(
        &self,
        ad: &PartnerAd,
        timeout: Duration,
        context: &DispatchContext,
    ) -> (Result<(), MediationError>, MetricsRecord) {
        let ad = ad.clone();
        let partner = ad.partner.clone();
        self.dispatch(&partner, LifecycleEvent::Invalidate, timeout, context, move |adapter| {
            Box::pin(async move { adapter.invalidate(&ad).await })
        })
        .await
    }
}
