//! Resumable reconciliation progress
//!
//! Ids are only ever added. A crash between checkpoints re-processes at most
//! one checkpoint interval, which is safe because write-back is an upsert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted progress of one run key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Records handled in any earlier or current run
    pub processed_ids: BTreeSet<String>,
    pub succeeded: u64,
    pub skipped: u64,
    pub errored: u64,
    /// Id of the last record of the last completed sub-batch
    pub cursor: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn is_processed(&self, id: &str) -> bool {
        self.processed_ids.contains(id)
    }

    /// Record an id as processed; returns false when it already was
    pub fn mark_processed(&mut self, id: &str) -> bool {
        self.processed_ids.insert(id.to_string())
    }

    pub fn processed_count(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
