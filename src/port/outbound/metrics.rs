//! Metrics sink port.
//!
//! Lifecycle metrics are flushed per phase to a [`MetricsSink`]. Delivery is
//! fire-and-forget: sinks must return quickly and push slow work (network
//! uploads) onto their own tasks.

use crate::domain::metrics::{PhaseReport, WinnerEvent};

/// Everything the engine reports off-device.
#[derive(Debug, Clone)]
pub enum MetricsEvent {
    /// All records of one lifecycle phase.
    Phase(PhaseReport),
    /// The winner of a successful auction.
    AuctionWinner(WinnerEvent),
}

/// Receiver of metrics events.
///
/// # Implementation Notes
///
/// - Implementations must be thread-safe (`Send + Sync`)
/// - `report` must not block; spawn a task for I/O
pub trait MetricsSink: Send + Sync {
    fn report(&self, event: MetricsEvent);
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn report(&self, event: MetricsEvent) {
        (**self).report(event);
    }
}

/// Registry of sinks (composite pattern).
///
/// Broadcasts events to all registered sinks.
#[derive(Default)]
pub struct MetricsSinkRegistry {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MetricsSinkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { sinks: vec![] }
    }

    /// Register a sink.
    pub fn register(&mut self, sink: Box<dyn MetricsSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for MetricsSinkRegistry {
    fn report(&self, event: MetricsEvent) {
        for sink in &self.sinks {
            sink.report(event.clone());
        }
    }
}

/// A no-op sink for when reporting is disabled.
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn report(&self, _event: MetricsEvent) {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::domain::metrics::{LifecycleEvent, PhaseResult};

    #[derive(Default)]
    struct CountingSink {
        count: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn report(&self, _event: MetricsEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event() -> MetricsEvent {
        MetricsEvent::Phase(PhaseReport::new(
            LifecycleEvent::Show,
            Utc::now(),
            PhaseResult::Success,
            Vec::new(),
        ))
    }

    #[test]
    fn registry_broadcasts_to_every_sink() {
        let first = Arc::new(CountingSink::default());
        let second = Arc::new(CountingSink::default());
        let mut registry = MetricsSinkRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(Arc::clone(&first)));
        registry.register(Box::new(Arc::clone(&second)));
        registry.register(Box::new(NullMetricsSink));
        registry.report(event());

        assert_eq!(registry.len(), 3);
        assert_eq!(first.count.load(Ordering::SeqCst), 1);
        assert_eq!(second.count.load(Ordering::SeqCst), 1);
    }
}
