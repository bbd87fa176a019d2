//! Data models for vault-cm (CardMarket reconciler)

pub mod candidate;
pub mod match_result;
pub mod parameters;
pub mod progress;
pub mod reconcile_run;
pub mod source_record;

pub use candidate::{parse_attack_list, strip_attack_segment, CandidateListing};
pub use match_result::{MatchResult, ScoreBreakdown, Selection};
pub use parameters::{RunParameters, ACCEPT_THRESHOLD, REVIEW_THRESHOLD};
pub use progress::ProgressState;
pub use reconcile_run::{ErrorBreakdown, ReconcileRun, RecordError, RunReport, StateTransition};
pub use source_record::SourceRecord;
pub use vault_common::events::{ReferenceSource, RunState, RunTotals};
