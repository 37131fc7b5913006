//! Recording [`MetricsSink`] for tests.

use parking_lot::Mutex;

use crate::domain::metrics::{LifecycleEvent, PhaseReport, WinnerEvent};
use crate::port::outbound::metrics::{MetricsEvent, MetricsSink};

/// Keeps every reported event in memory.
#[derive(Default)]
pub struct RecordingMetricsSink {
    events: Mutex<Vec<MetricsEvent>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricsEvent> {
        self.events.lock().clone()
    }

    /// Flushed reports of `phase`, in report order.
    pub fn phases(&self, phase: LifecycleEvent) -> Vec<PhaseReport> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MetricsEvent::Phase(report) if report.phase == phase => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn winners(&self) -> Vec<WinnerEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MetricsEvent::AuctionWinner(winner) => Some(winner.clone()),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn report(&self, event: MetricsEvent) {
        self.events.lock().push(event);
    }
}
