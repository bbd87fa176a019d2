//! Reconciliation run type definitions
//!
//! Supporting types for vault-cm reconciliation progress tracking.

use serde::{Deserialize, Serialize};

/// Reconciliation run state
///
/// `Idle → Paging → Filtering → Processing → Checkpointing →
/// (Processing | Done | Cancelled | QuotaExhausted | Aborted)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Run created, nothing fetched yet
    Idle,
    /// Scanning the record store page by page
    Paging,
    /// Dropping already-processed and already-resolved records
    Filtering,
    /// Resolving a sub-batch
    Processing,
    /// Persisting progress
    Checkpointing,
    /// Every pending record was handled
    Done,
    /// Stopped by the cancellation token
    Cancelled,
    /// Request budget used up
    QuotaExhausted,
    /// Unrecovered failure
    Aborted,
}

impl RunState {
    /// Terminal states end the run; no further transitions happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::Cancelled | RunState::QuotaExhausted | RunState::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "IDLE",
            RunState::Paging => "PAGING",
            RunState::Filtering => "FILTERING",
            RunState::Processing => "PROCESSING",
            RunState::Checkpointing => "CHECKPOINTING",
            RunState::Done => "DONE",
            RunState::Cancelled => "CANCELLED",
            RunState::QuotaExhausted => "QUOTA_EXHAUSTED",
            RunState::Aborted => "ABORTED",
        }
    }
}

/// How a record's catalog reference was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// Identifier already embedded in the record (no scoring)
    Direct,
    /// Accepted candidate from the matcher
    Matched,
}

/// Running totals carried by progress events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub pending: usize,
    pub processed: usize,
    pub succeeded: u64,
    pub skipped: u64,
    pub errored: u64,
    pub external_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::QuotaExhausted.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        assert!(!RunState::Checkpointing.is_terminal());
        assert!(!RunState::Idle.is_terminal());
    }

    #[test]
    fn test_state_serializes_like_as_str() {
        for state in [RunState::Paging, RunState::QuotaExhausted, RunState::Done] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
