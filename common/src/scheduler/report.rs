// Pass and cron-run outcome reporting

use super::transition::TransitionState;
use crate::models::{ItemId, Process, Timestamp};
use crate::telemetry;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Result for one translation of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub entity_type: String,
    pub id: ItemId,
    pub langcode: String,
    pub state: TransitionState,
}

/// Aggregated result of one `publish()` or `unpublish()` pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub process: Process,
    pub as_of: Timestamp,
    pub outcomes: Vec<ItemOutcome>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(process: Process, as_of: Timestamp) -> Self {
        Self {
            process,
            as_of,
            outcomes: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        if outcome.state != TransitionState::Ineligible {
            telemetry::record_transition(
                &outcome.entity_type,
                self.process.as_str(),
                outcome.state.as_str(),
            );
        }
        self.outcomes.push(outcome);
    }

    /// At least one item was transitioned
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.state.is_changed())
    }

    pub fn count(&self, state: TransitionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn transitioned(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state.is_changed()).count()
    }

    /// Items whose process hook reported failure
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TransitionState::Failed)
    }

    /// Ids in processing order, one entry per translation
    pub fn processed_ids(&self) -> Vec<ItemId> {
        self.outcomes
            .iter()
            .filter(|o| o.state.is_changed())
            .map(|o| o.id)
            .collect()
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.duration_ms = elapsed.as_millis() as u64;
        telemetry::record_pass(self.process.as_str(), elapsed.as_secs_f64());
    }

    /// One summary line for the pass
    pub fn log_summary(&self) {
        if self.changed() {
            info!(
                process = %self.process,
                transitioned = self.transitioned(),
                failed = self.count(TransitionState::Failed),
                duration_ms = self.duration_ms,
                "Scheduled {} pass completed",
                self.process
            );
        } else {
            debug!(process = %self.process, "Nothing to {}", self.process);
        }
    }
}

/// Result of one lightweight cron run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronReport {
    pub trigger: String,
    pub publish: PassReport,
    pub unpublish: PassReport,
}

impl CronReport {
    pub fn changed(&self) -> bool {
        self.publish.changed() || self.unpublish.changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: ItemId, state: TransitionState) -> ItemOutcome {
        ItemOutcome {
            entity_type: "node".to_string(),
            id,
            langcode: "en".to_string(),
            state,
        }
    }

    #[test]
    fn test_changed_counts_committed_and_external() {
        let mut report = PassReport::new(Process::Publish, 100);
        report.record(outcome(1, TransitionState::Ineligible));
        report.record(outcome(2, TransitionState::Failed));
        assert!(!report.changed());

        report.record(outcome(3, TransitionState::ExternallyHandled));
        assert!(report.changed());
        report.record(outcome(4, TransitionState::Committed));

        assert_eq!(report.transitioned(), 2);
        assert_eq!(report.processed_ids(), vec![3, 4]);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_finish_sets_duration() {
        let mut report = PassReport::new(Process::Unpublish, 0);
        report.finish(Duration::from_millis(42));
        assert_eq!(report.duration_ms, 42);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = PassReport::new(Process::Publish, 7);
        report.record(outcome(1, TransitionState::Committed));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["process"], "publish");
        assert_eq!(json["outcomes"][0]["state"], "committed");
    }
}
