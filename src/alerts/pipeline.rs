use tracing::{debug, instrument, warn};

use super::{AlertDeduplicator, AlertDispatcher, AlertEvent, DispatchReport};

/// What happened to one candidate alert
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Already alerted in this window
    Suppressed { key: String },

    /// Sent to the channels; the claim is released again unless one of them
    /// delivered
    Dispatched { key: String, report: DispatchReport },
}

impl PipelineOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, PipelineOutcome::Suppressed { .. })
    }

    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            PipelineOutcome::Suppressed { .. } => None,
            PipelineOutcome::Dispatched { report, .. } => Some(report),
        }
    }
}

/// Claim, dispatch and, when nothing was delivered, release. Shared by the monitor loop,
/// the CLI and the error-rate tracker.
#[derive(Clone)]
pub struct AlertPipeline {
    dedup: AlertDeduplicator,
    dispatcher: AlertDispatcher,
}

impl AlertPipeline {
    pub fn new(dedup: AlertDeduplicator, dispatcher: AlertDispatcher) -> Self {
        Self { dedup, dispatcher }
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn dedup(&self) -> &AlertDeduplicator {
        &self.dedup
    }

    #[instrument(skip(self, event), fields(alert_type = %event.alert_type))]
    pub async fn process(&self, event: &AlertEvent) -> PipelineOutcome {
        let decision = self.dedup.claim(event).await;
        if decision.suppressed {
            return PipelineOutcome::Suppressed { key: decision.key };
        }

        let report = self.dispatcher.dispatch(event).await;
        if report.all_failed() {
            warn!(
                "every channel failed for {}, releasing {}",
                event.alert_type, decision.key
            );
            self.dedup.release(&decision).await;
        } else if report.is_empty() {
            debug!(
                "no channel accepts {} alerts, releasing {}",
                event.severity, decision.key
            );
            self.dedup.release(&decision).await;
        }

        PipelineOutcome::Dispatched {
            key: decision.key,
            report,
        }
    }

    /// Process candidates one after another, in order.
    pub async fn process_all(&self, events: &[AlertEvent]) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.process(event).await);
        }
        outcomes
    }
}
