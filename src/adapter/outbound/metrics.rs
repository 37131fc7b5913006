//! Metrics sink that writes to the tracing pipeline.

use tracing::{debug, info, warn};

use crate::domain::metrics::{PhaseReport, PhaseResult};
use crate::port::outbound::metrics::{MetricsEvent, MetricsSink};

/// Emits every metrics event as a structured log line.
///
/// The full report is attached as JSON at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl LogMetricsSink {
    fn report_phase(report: &PhaseReport) {
        let placement = report.placement.as_ref().map(|p| p.as_str()).unwrap_or("-");
        let elapsed_ms = (report.ended_at - report.started_at).num_milliseconds();
        match &report.result {
            PhaseResult::Success => info!(
                phase = %report.phase,
                placement,
                records = report.records.len(),
                elapsed_ms,
                "Phase succeeded"
            ),
            PhaseResult::PartnerFailure { partner, error } => warn!(
                phase = %report.phase,
                placement,
                partner = %partner,
                error = error.code(),
                records = report.records.len(),
                elapsed_ms,
                "Phase failed at partner"
            ),
            PhaseResult::Failure { error } => warn!(
                phase = %report.phase,
                placement,
                error = error.code(),
                elapsed_ms,
                "Phase failed"
            ),
        }

        match serde_json::to_string(report) {
            Ok(payload) => debug!(phase = %report.phase, payload = %payload, "Phase report"),
            Err(e) => warn!(phase = %report.phase, error = %e, "Phase report not serializable"),
        }
    }
}

impl MetricsSink for LogMetricsSink {
    fn report(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::Phase(report) => Self::report_phase(&report),
            MetricsEvent::AuctionWinner(winner) => info!(
                auction_id = %winner.auction_id,
                load_id = %winner.load_id,
                placement = %winner.placement,
                partner = %winner.partner,
                price = %winner.price,
                "Auction winner"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::id::PartnerId;
    use crate::domain::metrics::{LifecycleEvent, MetricsRecord};
    use crate::error::ErrorKind;

    #[test]
    fn reports_every_phase_shape() {
        let sink = LogMetricsSink;
        let mut record = MetricsRecord::start(PartnerId::from("alpha"), LifecycleEvent::Load);
        record.seal(Err(ErrorKind::AdapterTimeout));

        for result in [
            PhaseResult::Success,
            PhaseResult::PartnerFailure {
                partner: PartnerId::from("alpha"),
                error: ErrorKind::AdapterTimeout,
            },
            PhaseResult::Failure {
                error: ErrorKind::AuctionNoBid,
            },
        ] {
            sink.report(MetricsEvent::Phase(PhaseReport::new(
                LifecycleEvent::Load,
                Utc::now(),
                result,
                vec![record.clone()],
            )));
        }
    }

    #[test]
    fn phase_report_serializes() {
        let report = PhaseReport::new(
            LifecycleEvent::Prebid,
            Utc::now(),
            PhaseResult::Failure {
                error: ErrorKind::RateLimited,
            },
            Vec::new(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "prebid");
        assert_eq!(json["result"]["result"], "failure");
        assert_eq!(json["result"]["error"], "rate_limited");
    }
}
