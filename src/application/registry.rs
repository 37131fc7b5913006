//! Partner adapter registry.
//!
//! Holds one adapter per partner together with its initialization status.
//! Adapters are created from an [`AdapterFactories`] table and initialized
//! concurrently by [`AdapterRegistry::initialize_all`].
//!
//! # State Machine
//!
//! ```text
//! Idle --> Initializing --> Initialized
//!                      \--> Failed      (removed from routing)
//! Idle --> Skipped                      (removed from routing)
//! ```
//!
//! Only `Initialized` adapters are routable. A failed or skipped partner
//! comes back only through a fresh `initialize_all` pass.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::id::PartnerId;
use crate::domain::metrics::{LifecycleEvent, MetricsRecord};
use crate::error::MediationError;
use crate::port::outbound::partner::{ConsentMap, PartnerAdapter, PartnerConfig};

use super::dispatch::{call_detached, CallOutcome};

/// Factory function for creating a partner adapter.
///
/// Registered per partner before initialization.
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn PartnerAdapter> + Send + Sync>;

/// Initialization status of a partner adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStatus {
    Idle,
    Initializing,
    Initialized,
    Failed,
    Skipped,
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Versions stamped onto every metrics record for a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterVersions {
    pub partner: String,
    pub adapter: String,
}

/// Registration table mapping partner IDs to adapter factories.
#[derive(Clone, Default)]
pub struct AdapterFactories {
    factories: HashMap<PartnerId, AdapterFactory>,
}

impl AdapterFactories {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the partner.
    pub fn register(&mut self, partner: impl Into<PartnerId>, factory: AdapterFactory) {
        self.factories.insert(partner.into(), factory);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, partner: impl Into<PartnerId>, factory: AdapterFactory) -> Self {
        self.register(partner, factory);
        self
    }

    /// Instantiate the adapter for `partner`.
    pub fn create(&self, partner: &PartnerId) -> Result<Arc<dyn PartnerAdapter>, MediationError> {
        self.factories
            .get(partner)
            .map(|factory| factory())
            .ok_or_else(|| MediationError::AdapterNotFound {
                partner: partner.clone(),
            })
    }

    pub fn contains(&self, partner: &PartnerId) -> bool {
        self.factories.contains_key(partner)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Registry entry for a partner that has not been retired.
#[derive(Clone)]
pub struct AdapterRecord {
    pub adapter: Arc<dyn PartnerAdapter>,
    pub status: InitStatus,
    pub versions: AdapterVersions,
}

/// Outcome of one partner's initialization.
#[derive(Debug, Clone)]
pub struct PartnerInitOutcome {
    pub partner: PartnerId,
    pub status: InitStatus,
    pub error: Option<MediationError>,
    pub record: Option<MetricsRecord>,
}

/// What `initialize_all` knew when its overall deadline fired (or every
/// partner finished, whichever came first).
#[derive(Debug, Clone, Default)]
pub struct InitializationReport {
    pub outcomes: Vec<PartnerInitOutcome>,
    /// Partners still initializing in the background.
    pub pending: Vec<PartnerId>,
}

impl InitializationReport {
    pub fn initialized(&self) -> impl Iterator<Item = &PartnerId> {
        self.with_status(InitStatus::Initialized)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PartnerId> {
        self.with_status(InitStatus::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PartnerId> {
        self.with_status(InitStatus::Skipped)
    }

    fn with_status(&self, status: InitStatus) -> impl Iterator<Item = &PartnerId> {
        self.outcomes
            .iter()
            .filter(move |o| o.status == status)
            .map(|o| &o.partner)
    }

    /// Metrics records of every completed set-up call.
    pub fn records(&self) -> Vec<MetricsRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| o.record.clone())
            .collect()
    }
}

/// Concurrent registry of partner adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<PartnerId, AdapterRecord>,
    retired: DashMap<PartnerId, InitStatus>,
    consents: RwLock<Option<ConsentMap>>,
    underage: RwLock<Option<bool>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter in the `Idle` state, replacing any previous entry.
    pub fn register(&self, adapter: Arc<dyn PartnerAdapter>) {
        let partner = adapter.partner_id();
        let versions = AdapterVersions {
            partner: adapter.partner_version(),
            adapter: adapter.adapter_version(),
        };
        self.retired.remove(&partner);
        self.adapters.insert(
            partner,
            AdapterRecord {
                adapter,
                status: InitStatus::Idle,
                versions,
            },
        );
    }

    /// Register an adapter that skips set-up and is routable at once.
    #[cfg(any(test, feature = "testkit"))]
    pub fn register_initialized(&self, adapter: Arc<dyn PartnerAdapter>) {
        let partner = adapter.partner_id();
        self.register(adapter);
        self.transition(&partner, InitStatus::Initialized);
    }

    /// Current status of a partner, `None` if the registry never saw it.
    pub fn status(&self, partner: &PartnerId) -> Option<InitStatus> {
        self.adapters
            .get(partner)
            .map(|record| record.status)
            .or_else(|| self.retired.get(partner).map(|status| *status))
    }

    /// Adapter and versions for a routable partner.
    pub fn route(
        &self,
        partner: &PartnerId,
    ) -> Result<(Arc<dyn PartnerAdapter>, AdapterVersions), MediationError> {
        match self.adapters.get(partner) {
            Some(record) if record.status == InitStatus::Initialized => {
                Ok((Arc::clone(&record.adapter), record.versions.clone()))
            }
            _ => Err(MediationError::AdapterNotFound {
                partner: partner.clone(),
            }),
        }
    }

    /// All routable partners, sorted by ID.
    pub fn routable_partners(&self) -> Vec<PartnerId> {
        let mut partners: Vec<PartnerId> = self
            .adapters
            .iter()
            .filter(|entry| entry.status == InitStatus::Initialized)
            .map(|entry| entry.key().clone())
            .collect();
        partners.sort();
        partners
    }

    /// Mark a partner skipped. Terminal until the next initialization pass.
    pub fn skip(&self, partner: &PartnerId) {
        self.retire(partner, InitStatus::Skipped);
    }

    fn retire(&self, partner: &PartnerId, status: InitStatus) {
        self.adapters.remove(partner);
        self.retired.insert(partner.clone(), status);
    }

    fn transition(&self, partner: &PartnerId, status: InitStatus) {
        match status {
            InitStatus::Failed | InitStatus::Skipped => self.retire(partner, status),
            _ => {
                if let Some(mut record) = self.adapters.get_mut(partner) {
                    record.status = status;
                }
            }
        }
    }

    /// Forward consent signals to every routable adapter.
    ///
    /// The latest value is also applied to adapters that finish
    /// initializing later.
    pub fn set_consents(&self, consents: ConsentMap) {
        *self.consents.write() = Some(consents.clone());
        for partner in self.routable_partners() {
            if let Ok((adapter, _)) = self.route(&partner) {
                adapter.set_consents(&consents);
            }
        }
    }

    /// Forward the age-restriction flag to every routable adapter.
    pub fn set_underage(&self, underage: bool) {
        *self.underage.write() = Some(underage);
        for partner in self.routable_partners() {
            if let Ok((adapter, _)) = self.route(&partner) {
                adapter.set_underage(underage);
            }
        }
    }

    fn apply_privacy(&self, adapter: &dyn PartnerAdapter) {
        if let Some(consents) = self.consents.read().as_ref() {
            adapter.set_consents(consents);
        }
        if let Some(underage) = *self.underage.read() {
            adapter.set_underage(underage);
        }
    }

    /// Initialize every configured, non-skipped partner concurrently.
    ///
    /// Each set-up call runs on its own task under `per_adapter` and a failure
    /// only retires that partner. The report is returned when every partner
    /// finished or when `overall` elapses, whichever comes first; partners
    /// still running keep going and update the registry when they finish.
    pub async fn initialize_all(
        self: &Arc<Self>,
        factories: &AdapterFactories,
        configs: Vec<PartnerConfig>,
        skip: &HashSet<PartnerId>,
        per_adapter: Duration,
        overall: Duration,
    ) -> InitializationReport {
        let deadline = Instant::now() + overall;
        let (tx, mut rx) = mpsc::unbounded_channel::<PartnerInitOutcome>();
        let mut report = InitializationReport::default();
        let mut pending: HashSet<PartnerId> = HashSet::new();

        for config in configs {
            let partner = config.partner.clone();

            if skip.contains(&partner) {
                info!(partner = %partner, "Skipping partner initialization");
                self.skip(&partner);
                report.outcomes.push(PartnerInitOutcome {
                    partner,
                    status: InitStatus::Skipped,
                    error: None,
                    record: None,
                });
                continue;
            }

            if matches!(
                self.status(&partner),
                Some(InitStatus::Initialized | InitStatus::Initializing)
            ) {
                debug!(partner = %partner, "Partner already initialized or initializing");
                continue;
            }

            let adapter = match factories.create(&partner) {
                Ok(adapter) => adapter,
                Err(e) => {
                    warn!(partner = %partner, error = %e, "No adapter factory for partner");
                    self.retire(&partner, InitStatus::Failed);
                    report.outcomes.push(PartnerInitOutcome {
                        partner,
                        status: InitStatus::Failed,
                        error: Some(e),
                        record: None,
                    });
                    continue;
                }
            };

            self.register(Arc::clone(&adapter));
            self.transition(&partner, InitStatus::Initializing);
            pending.insert(partner.clone());

            let registry = Arc::clone(self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = registry.initialize_one(adapter, config, per_adapter).await;
                // The collector is gone once the overall deadline fired.
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(outcome)) => {
                    pending.remove(&outcome.partner);
                    report.outcomes.push(outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = pending.len(),
                        "Initialization deadline reached, remaining partners continue in background"
                    );
                    break;
                }
            }
        }

        report.pending = pending.into_iter().collect();
        report.pending.sort();

        info!(
            initialized = report.initialized().count(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            pending = report.pending.len(),
            "Partner initialization reported"
        );

        report
    }

    async fn initialize_one(
        &self,
        adapter: Arc<dyn PartnerAdapter>,
        config: PartnerConfig,
        timeout: Duration,
    ) -> PartnerInitOutcome {
        let partner = config.partner.clone();
        let mut record = MetricsRecord::start(partner.clone(), LifecycleEvent::Initialization)
            .with_versions(adapter.partner_version(), adapter.adapter_version());

        let call_adapter = Arc::clone(&adapter);
        let outcome = call_detached(
            Box::pin(async move { call_adapter.set_up(&config).await }),
            timeout,
        )
        .await;

        let result = match outcome {
            CallOutcome::Completed(Ok(())) => Ok(()),
            CallOutcome::Completed(Err(e)) => Err(MediationError::PartnerInitFailed {
                partner: partner.clone(),
                reason: e.to_string(),
            }),
            CallOutcome::Panicked(message) => Err(MediationError::PartnerInitFailed {
                partner: partner.clone(),
                reason: format!("adapter panicked: {message}"),
            }),
            CallOutcome::TimedOut => Err(MediationError::AdapterTimeout {
                partner: partner.clone(),
                operation: LifecycleEvent::Initialization,
                timeout,
            }),
        };

        record.seal(result.as_ref().map(|_| ()).map_err(MediationError::kind));

        match result {
            Ok(()) => {
                // Routable first, so a concurrent setter either reaches the
                // adapter or is picked up here.
                self.transition(&partner, InitStatus::Initialized);
                self.apply_privacy(adapter.as_ref());
                info!(
                    partner = %partner,
                    elapsed = ?record.duration,
                    "Partner initialized"
                );
                PartnerInitOutcome {
                    partner,
                    status: InitStatus::Initialized,
                    error: None,
                    record: Some(record),
                }
            }
            Err(e) => {
                warn!(partner = %partner, error = %e, "Partner initialization failed");
                self.transition(&partner, InitStatus::Failed);
                PartnerInitOutcome {
                    partner,
                    status: InitStatus::Failed,
                    error: Some(e),
                    record: Some(record),
                }
            }
        }
    }
}
