//! Match Selector
//!
//! Applies an acceptance threshold to a scored candidate set. Use
//! [`ACCEPT_THRESHOLD`](crate::models::ACCEPT_THRESHOLD) for automatic
//! acceptance and [`REVIEW_THRESHOLD`](crate::models::REVIEW_THRESHOLD) for
//! exploratory lookups.

use std::cmp::Ordering;

use super::ScoringEngine;
use crate::models::{CandidateListing, MatchResult, Selection, SourceRecord};

/// Match selector
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchSelector {
    engine: ScoringEngine,
}

impl MatchSelector {
    pub fn new(engine: ScoringEngine) -> Self {
        Self { engine }
    }

    /// Score, rank and select
    ///
    /// `best` is the top-ranked candidate when its score is at least
    /// `threshold`; `ranked` always holds every candidate.
    pub fn select(&self, source: &SourceRecord, candidates: &[CandidateListing], threshold: f64) -> Selection {
        let ranked = rank(self.engine.score_all(source, candidates));
        let best = ranked.first().filter(|m| m.score >= threshold).cloned();

        Selection {
            best,
            ranked,
            threshold,
        }
    }
}

/// Sort by score descending, ties by ascending catalog id
pub fn rank(mut results: Vec<MatchResult>) -> Vec<MatchResult> {
    results.sort_by(compare_ranked);
    results
}

fn compare_ranked(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.catalog_id.cmp(&b.candidate.catalog_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ACCEPT_THRESHOLD, REVIEW_THRESHOLD};

    fn candidates() -> Vec<CandidateListing> {
        vec![
            CandidateListing::new(202, "Amoonguss [Foul Play] ex", ""),
            CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", ""),
        ]
    }

    #[test]
    fn test_selects_full_attack_match() {
        let source = SourceRecord::new("sv2-11", "Amoonguss").with_attacks(["Sporprise", "Rising Lunge"]);
        let selection = MatchSelector::default().select(&source, &candidates(), ACCEPT_THRESHOLD);

        let best = selection.best.expect("match expected");
        assert_eq!(best.candidate.catalog_id, 101);
        assert_eq!(best.score, 1.0);
        assert_eq!(selection.ranked.len(), 2);
        assert_eq!(selection.ranked[1].candidate.catalog_id, 202);
    }

    #[test]
    fn test_no_attacks_means_no_automatic_match() {
        let source = SourceRecord::new("sv2-11", "Amoonguss");
        let selection = MatchSelector::default().select(&source, &candidates(), ACCEPT_THRESHOLD);

        assert!(selection.best.is_none());
        assert!(selection.ranked.iter().all(|m| m.score <= 0.3));
        assert_eq!(selection.top().map(|m| m.candidate.catalog_id), Some(101));
    }

    #[test]
    fn test_review_threshold_accepts_weaker_match() {
        let source = SourceRecord::new("sv2-11", "Amoonguss");
        let selection = MatchSelector::default().select(&source, &candidates(), REVIEW_THRESHOLD);
        assert_eq!(selection.best.map(|m| m.candidate.catalog_id), Some(101));
    }

    #[test]
    fn test_ties_break_by_catalog_id() {
        let source = SourceRecord::new("a-1", "Pikachu");
        let listings = vec![
            CandidateListing::new(30, "Pikachu", ""),
            CandidateListing::new(10, "Pikachu", ""),
            CandidateListing::new(20, "Pikachu", ""),
        ];
        let selection = MatchSelector::default().select(&source, &listings, 0.0);
        let ids: Vec<u64> = selection.ranked.iter().map(|m| m.candidate.catalog_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(selection.best.map(|m| m.candidate.catalog_id), Some(10));
    }

    #[test]
    fn test_empty_candidate_set() {
        let source = SourceRecord::new("a-1", "Pikachu");
        let selection = MatchSelector::default().select(&source, &[], 0.0);
        assert!(selection.best.is_none());
        assert!(selection.ranked.is_empty());
    }
}
