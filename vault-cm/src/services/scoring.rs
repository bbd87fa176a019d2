//! Scoring Engine
//!
//! Pure scoring of one source record against one catalog listing:
//!
//! `total = 0.7 * attack_score + 0.2 * name_score + suffix_bonus`
//!
//! where `suffix_bonus` is 0.1 when both names carry the same set of variant
//! suffixes and 0 otherwise. The weights are not renormalized when attack
//! data is missing, so a record without attacks tops out at 0.3.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

use crate::models::{CandidateListing, MatchResult, ScoreBreakdown, SourceRecord};

/// Weight of the attack overlap ratio
pub const ATTACK_WEIGHT: f64 = 0.7;

/// Weight of the name similarity ratio
pub const NAME_WEIGHT: f64 = 0.2;

/// Bonus added when variant suffixes agree
pub const SUFFIX_BONUS: f64 = 0.1;

/// Variant suffix tokens compared by the suffix check (case-insensitive)
pub const VARIANT_SUFFIXES: [&str; 5] = ["VMAX", "VSTAR", "V", "GX", "EX"];

/// Words removed from a name to build the catalog search prefix
static SEARCH_STRIP_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:VMAX|VSTAR|V|GX|EX|Radiant|Shining|Prism Star|Break|Mega|M)\b")
        .expect("search strip pattern is valid")
});

/// Scoring engine
///
/// Stateless; cheap to construct and share.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a candidate against a source record
    ///
    /// Returns a [`MatchResult`] whose score lies in [0, 1]. An empty source
    /// name or candidate name scores 0 with an all-zero breakdown.
    pub fn score(&self, source: &SourceRecord, candidate: &CandidateListing) -> MatchResult {
        let source_name = source.name.trim();
        let candidate_name = candidate.card_name.trim();

        if source_name.is_empty() || candidate_name.is_empty() {
            return MatchResult {
                candidate: candidate.clone(),
                score: 0.0,
                breakdown: ScoreBreakdown::default(),
            };
        }

        let attack_score = attack_overlap(source.attack_names(), candidate.attacks.iter().map(String::as_str));
        let name_score = name_similarity(source_name, candidate_name);
        let suffix_bonus = if suffix_set(source_name) == suffix_set(candidate_name) {
            SUFFIX_BONUS
        } else {
            0.0
        };

        let total = ATTACK_WEIGHT * attack_score.clamp(0.0, 1.0)
            + NAME_WEIGHT * name_score.clamp(0.0, 1.0)
            + suffix_bonus;

        MatchResult {
            candidate: candidate.clone(),
            score: snap(total.clamp(0.0, 1.0)),
            breakdown: ScoreBreakdown {
                attack_score,
                name_score,
                suffix_bonus,
            },
        }
    }

    /// Score every candidate, preserving input order
    pub fn score_all(&self, source: &SourceRecord, candidates: &[CandidateListing]) -> Vec<MatchResult> {
        candidates.iter().map(|c| self.score(source, c)).collect()
    }
}

/// Round to 9 decimals so 0.7 + 0.2 + 0.1 lands exactly on 1.0
fn snap(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

/// Share of source attacks found in the candidate's attack list
///
/// Compared case-insensitively after trimming; blank entries are ignored.
/// Each source entry counts on its own, repeats included, and the count is
/// divided by the longer of the two lists. Returns 0 when either is empty.
pub fn attack_overlap<'a, 'b>(
    source: impl IntoIterator<Item = &'a str>,
    candidate: impl IntoIterator<Item = &'b str>,
) -> f64 {
    let normalize = |a: &str| a.trim().to_lowercase();
    let source: Vec<String> = source.into_iter().map(normalize).filter(|a| !a.is_empty()).collect();
    let candidate: Vec<String> = candidate.into_iter().map(normalize).filter(|a| !a.is_empty()).collect();

    if source.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let matched = source.iter().filter(|attack| candidate.contains(attack)).count();
    matched as f64 / source.len().max(candidate.len()) as f64
}

/// Name similarity in [0, 1]
///
/// Exact (case-insensitive, trimmed) match scores 1.0, containment in either
/// direction 0.8, anything else the shared-character count over the longer
/// length.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }

    let longest = a.chars().count().max(b.chars().count());
    common_char_count(&a, &b) as f64 / longest as f64
}

/// Characters the two strings share, each occurrence counted once
fn common_char_count(a: &str, b: &str) -> usize {
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_insert(0) += 1;
    }

    let mut count = 0;
    for c in a.chars() {
        if let Some(n) = available.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                count += 1;
            }
        }
    }
    count
}

/// Variant suffix tokens present in a name as whole words
pub fn suffix_set(name: &str) -> BTreeSet<&'static str> {
    name.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .filter_map(|word| {
            VARIANT_SUFFIXES
                .iter()
                .copied()
                .find(|suffix| word.eq_ignore_ascii_case(suffix))
        })
        .collect()
}

/// Catalog search prefix: the name without variant and era markers
///
/// `"Charizard VMAX"` → `"Charizard"`, `"Radiant Greninja"` → `"Greninja"`.
/// Falls back to the trimmed name when stripping leaves nothing.
pub fn base_name_query(name: &str) -> String {
    let stripped = SEARCH_STRIP_WORDS.replace_all(name, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        name.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amoonguss() -> SourceRecord {
        SourceRecord::new("sv2-11", "Amoonguss").with_attacks(["Sporprise", "Rising Lunge"])
    }

    #[test]
    fn test_exact_listing_scores_one() {
        let engine = ScoringEngine::new();
        let listing = CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", "");

        let result = engine.score(&amoonguss(), &listing);
        assert_eq!(result.breakdown.attack_score, 1.0);
        assert_eq!(result.breakdown.name_score, 1.0);
        assert_eq!(result.breakdown.suffix_bonus, SUFFIX_BONUS);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_other_variant_scores_low() {
        let engine = ScoringEngine::new();
        let listing = CandidateListing::new(202, "Amoonguss [Foul Play] ex", "");

        let result = engine.score(&amoonguss(), &listing);
        assert_eq!(result.breakdown.attack_score, 0.0);
        assert_eq!(result.breakdown.name_score, 0.8);
        assert_eq!(result.breakdown.suffix_bonus, 0.0);
        assert!((result.score - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_missing_attacks_cap_score() {
        let engine = ScoringEngine::new();
        let source = SourceRecord::new("sv2-11", "Amoonguss");
        let listing = CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", "");

        let result = engine.score(&source, &listing);
        assert_eq!(result.breakdown.attack_score, 0.0);
        assert_eq!(result.score, 0.3);
    }

    #[test]
    fn test_empty_names_score_zero() {
        let engine = ScoringEngine::new();
        let listing = CandidateListing::new(1, "[Tackle]", "");
        let source = SourceRecord::new("a-1", "Pikachu").with_attacks(["Tackle"]);
        assert_eq!(engine.score(&source, &listing).score, 0.0);

        let blank = SourceRecord::new("a-1", "   ").with_attacks(["Tackle"]);
        let listing = CandidateListing::new(1, "Pikachu [Tackle]", "");
        assert_eq!(engine.score(&blank, &listing).score, 0.0);
    }

    #[test]
    fn test_name_similarity_rules() {
        assert_eq!(name_similarity("Pikachu", " pikachu "), 1.0);
        assert_eq!(name_similarity("Pikachu", "Pikachu V"), 0.8);
        assert_eq!(name_similarity("Pikachu V", "Pikachu"), 0.8);
        // "abc" vs "abd": a and b shared, longer length 3
        assert!((name_similarity("abc", "abd") - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(name_similarity("", "Pikachu"), 0.0);
    }

    #[test]
    fn test_common_chars_count_each_occurrence_once() {
        assert_eq!(common_char_count("aab", "abb"), 2);
        assert_eq!(common_char_count("xyz", "abc"), 0);
    }

    #[test]
    fn test_attack_overlap_uses_larger_list() {
        assert_eq!(attack_overlap(["Tackle"], ["tackle", "growl"]), 0.5);
        assert_eq!(attack_overlap(["tackle", "growl"], ["Tackle"]), 0.5);
        assert_eq!(attack_overlap(Vec::<&str>::new(), ["tackle"]), 0.0);
        assert_eq!(attack_overlap([" Tackle ", "GROWL"], ["growl", "tackle"]), 1.0);
    }

    #[test]
    fn test_attack_overlap_counts_repeated_entries() {
        assert_eq!(attack_overlap(["Tackle", "Tackle"], ["tackle", "growl"]), 1.0);
        assert_eq!(attack_overlap(["Tackle"], ["tackle", "tackle"]), 0.5);
        assert_eq!(attack_overlap(["Tackle", "", "  "], ["tackle"]), 1.0);
    }

    #[test]
    fn test_suffix_set_whole_words_only() {
        assert_eq!(suffix_set("Charizard VMAX"), BTreeSet::from(["VMAX"]));
        assert_eq!(suffix_set("Mew ex"), BTreeSet::from(["EX"]));
        assert_eq!(suffix_set("Mew EX"), suffix_set("Mew ex"));
        assert!(suffix_set("Vulpix").is_empty());
        assert!(suffix_set("Exeggutor").is_empty());
        assert_eq!(suffix_set("Pikachu V-UNION"), BTreeSet::from(["V"]));
    }

    #[test]
    fn test_base_name_query() {
        assert_eq!(base_name_query("Charizard VMAX"), "Charizard");
        assert_eq!(base_name_query("Radiant Greninja"), "Greninja");
        assert_eq!(base_name_query("Mew ex"), "Mew");
        assert_eq!(base_name_query("Vulpix"), "Vulpix");
        assert_eq!(base_name_query("M Rayquaza EX"), "Rayquaza");
        assert_eq!(base_name_query("Ho-Oh GX"), "Ho-Oh");
        assert_eq!(base_name_query("V"), "V");
    }
}
