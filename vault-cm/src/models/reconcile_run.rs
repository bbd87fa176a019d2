//! Reconciliation run state machine and report
//!
//! A run progresses through:
//! IDLE → PAGING → FILTERING → PROCESSING → CHECKPOINTING →
//! (PROCESSING | DONE | CANCELLED | QUOTA_EXHAUSTED | ABORTED)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vault_common::events::{RunState, RunTotals};

use super::RunParameters;

/// Per-record errors kept in a report; later ones are only counted
pub const MAX_REPORTED_ERRORS: usize = 100;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// Persisted reconciliation run (polled by the status endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub parameters: RunParameters,
    pub totals: RunTotals,
    /// Final report once the run is terminal
    pub report: Option<RunReport>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ReconcileRun {
    pub fn new(parameters: RunParameters) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            parameters,
            totals: RunTotals::default(),
            report: None,
            last_error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Record the final report and move to its state
    pub fn finish(&mut self, report: RunReport) {
        self.totals = report.totals();
        if let Some(error) = &report.abort_reason {
            self.last_error = Some(error.clone());
        }
        self.transition_to(report.final_state);
        self.report = Some(report);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }
}

/// Error counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    /// Catalog returned no candidates (counted as skipped)
    pub not_found: u64,
    /// Candidates found, none accepted (counted as skipped)
    pub no_match: u64,
    /// No slug for the record's expansion
    pub unmapped_expansion: u64,
    /// Lookup failed; record left eligible for a later run
    pub transient: u64,
    /// Write-back or checkpoint failures
    pub persistence: u64,
}

/// One per-record failure kept in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_id: String,
    /// Machine-readable kind (e.g. "UNMAPPED_EXPANSION")
    pub code: String,
    pub message: String,
}

/// Result of a BatchRunner invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_key: String,
    pub final_state: RunState,
    pub succeeded: u64,
    pub skipped: u64,
    pub errored: u64,
    pub breakdown: ErrorBreakdown,
    /// Records resolved from an embedded identifier
    pub direct_resolved: u64,
    pub external_requests: u64,
    pub records_scanned: usize,
    pub already_processed: usize,
    pub already_resolved: usize,
    /// Records that passed filtering
    pub pending: usize,
    /// Size of the processed-id set at the end of the run
    pub processed_total: usize,
    pub errors: Vec<RecordError>,
    /// Errors beyond `MAX_REPORTED_ERRORS` that were only counted
    pub errors_truncated: u64,
    pub abort_reason: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: Uuid, run_key: &str) -> Self {
        Self {
            run_id,
            run_key: run_key.to_string(),
            final_state: RunState::Idle,
            succeeded: 0,
            skipped: 0,
            errored: 0,
            breakdown: ErrorBreakdown::default(),
            direct_resolved: 0,
            external_requests: 0,
            records_scanned: 0,
            already_processed: 0,
            already_resolved: 0,
            pending: 0,
            processed_total: 0,
            errors: Vec::new(),
            errors_truncated: 0,
            abort_reason: None,
            duration_ms: 0,
        }
    }

    /// Keep the error if there is room, otherwise just count it
    pub fn push_error(&mut self, record_id: &str, code: &str, message: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(RecordError {
                record_id: record_id.to_string(),
                code: code.to_string(),
                message,
            });
        } else {
            self.errors_truncated += 1;
        }
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            pending: self.pending,
            processed: self.processed_total,
            succeeded: self.succeeded,
            skipped: self.skipped,
            errored: self.errored,
            external_requests: self.external_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_sets_end_time_on_terminal() {
        let mut run = ReconcileRun::new(RunParameters::default());
        assert_eq!(run.state, RunState::Idle);

        let t = run.transition_to(RunState::Paging);
        assert_eq!(t.old_state, RunState::Idle);
        assert_eq!(t.new_state, RunState::Paging);
        assert!(run.ended_at.is_none());

        run.transition_to(RunState::Cancelled);
        assert!(run.is_terminal());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_finish_copies_report() {
        let mut run = ReconcileRun::new(RunParameters::default());
        let mut report = RunReport::new(run.run_id, "default");
        report.final_state = RunState::QuotaExhausted;
        report.succeeded = 3;
        report.external_requests = 10;

        run.finish(report);
        assert_eq!(run.state, RunState::QuotaExhausted);
        assert_eq!(run.totals.succeeded, 3);
        assert_eq!(run.totals.external_requests, 10);
        assert!(run.report.is_some());
    }

    #[test]
    fn test_report_error_list_is_bounded() {
        let mut report = RunReport::new(Uuid::new_v4(), "default");
        for i in 0..(MAX_REPORTED_ERRORS + 7) {
            report.push_error(&format!("id-{i}"), "NOT_FOUND", "nothing".to_string());
        }
        assert_eq!(report.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(report.errors_truncated, 7);
    }
}
