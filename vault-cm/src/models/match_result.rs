//! Scoring and selection results
//!
//! Ephemeral: computed per invocation and never persisted.

use serde::{Deserialize, Serialize};

use super::CandidateListing;

/// Per-component view of a match score
///
/// `attack_score` and `name_score` are unweighted ratios in [0,1];
/// `suffix_bonus` is the already-weighted bonus (0.1 or 0.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub attack_score: f64,
    pub name_score: f64,
    pub suffix_bonus: f64,
}

/// One candidate with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: CandidateListing,
    /// Total score in [0,1]
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of applying an acceptance threshold to a candidate set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Highest-scoring candidate when it cleared the threshold
    pub best: Option<MatchResult>,
    /// Every candidate, score descending, ties by ascending catalog id
    pub ranked: Vec<MatchResult>,
    /// Threshold the selection was made with
    pub threshold: f64,
}

impl Selection {
    pub fn is_match(&self) -> bool {
        self.best.is_some()
    }

    /// Top-ranked candidate regardless of threshold
    pub fn top(&self) -> Option<&MatchResult> {
        self.ranked.first()
    }
}
