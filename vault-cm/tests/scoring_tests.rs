//! Scoring properties over a spread of realistic names and attack lists,
//! plus generated inputs through proptest

use proptest::prelude::*;
use vault_cm::models::{CandidateListing, SourceRecord, ACCEPT_THRESHOLD};
use vault_cm::services::scoring::{attack_overlap, name_similarity};
use vault_cm::services::{MatchSelector, ScoringEngine};

fn sources() -> Vec<SourceRecord> {
    vec![
        SourceRecord::new("sv2-11", "Amoonguss").with_attacks(["Sporprise", "Rising Lunge"]),
        SourceRecord::new("sv3-125", "Charizard ex").with_attacks(["Burning Darkness"]),
        SourceRecord::new("swsh7-1", "Rayquaza VMAX").with_attacks(["Dragon Pulse", "Max Burst"]),
        SourceRecord::new("sv1-81", "Pikachu"),
        SourceRecord::new("sv4-12", "  "),
        SourceRecord::new("sv2-40", "Amoonguss ex").with_attacks(["Foul Play", "Foul Play"]),
    ]
}

fn candidates() -> Vec<CandidateListing> {
    vec![
        CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", ""),
        CandidateListing::new(202, "Amoonguss [Foul Play] ex", ""),
        CandidateListing::new(303, "Charizard [Burning Darkness] ex", ""),
        CandidateListing::new(404, "Rayquaza VMAX [Dragon Pulse | Max Burst]", ""),
        CandidateListing::new(505, "Pikachu [Thunder Shock]", ""),
        CandidateListing::new(606, "Broken Listing [", ""),
        CandidateListing::new(707, "", ""),
    ]
}

#[test]
fn test_scores_are_bounded() {
    let engine = ScoringEngine::new();
    for source in sources() {
        for candidate in candidates() {
            let result = engine.score(&source, &candidate);
            assert!(
                (0.0..=1.0).contains(&result.score),
                "{} vs {} scored {}",
                source.name,
                candidate.name,
                result.score
            );
            assert!((0.0..=1.0).contains(&result.breakdown.attack_score));
            assert!((0.0..=1.0).contains(&result.breakdown.name_score));
            assert!(result.breakdown.suffix_bonus == 0.0 || result.breakdown.suffix_bonus == 0.1);
        }
    }
}

#[test]
fn test_scoring_is_deterministic() {
    let engine = ScoringEngine::new();
    for source in sources() {
        for candidate in candidates() {
            assert_eq!(engine.score(&source, &candidate), engine.score(&source, &candidate));
        }
    }
}

#[test]
fn test_records_without_attacks_never_exceed_three_tenths() {
    let engine = ScoringEngine::new();
    let source = SourceRecord::new("sv1-81", "Pikachu");
    for candidate in candidates() {
        assert!(engine.score(&source, &candidate).score <= 0.3);
    }
}

#[test]
fn test_identical_listing_scores_one() {
    let engine = ScoringEngine::new();
    let source = SourceRecord::new("swsh7-1", "Rayquaza VMAX").with_attacks(["Dragon Pulse", "Max Burst"]);
    let listing = CandidateListing::new(404, "Rayquaza VMAX [Dragon Pulse | Max Burst]", "");
    assert_eq!(engine.score(&source, &listing).score, 1.0);
}

#[test]
fn test_blank_names_score_zero() {
    let engine = ScoringEngine::new();
    let blank = SourceRecord::new("sv4-12", "  ").with_attacks(["Sporprise"]);
    for candidate in candidates() {
        assert_eq!(engine.score(&blank, &candidate).score, 0.0);
    }

    let source = SourceRecord::new("sv2-11", "Amoonguss").with_attacks(["Sporprise"]);
    let empty = CandidateListing::new(707, "", "");
    assert_eq!(engine.score(&source, &empty).score, 0.0);
}

#[test]
fn test_component_functions_are_symmetric() {
    let lists: Vec<Vec<&str>> = vec![
        vec!["Sporprise", "Rising Lunge"],
        vec!["sporprise"],
        vec!["Foul Play", "Sporprise", "Rising Lunge"],
        vec![],
    ];
    for a in &lists {
        for b in &lists {
            assert_eq!(
                attack_overlap(a.iter().copied(), b.iter().copied()),
                attack_overlap(b.iter().copied(), a.iter().copied())
            );
        }
    }

    let names = ["Amoonguss", "amoonguss ex", "Charizard", "Pikachu", "Raichu"];
    for a in names {
        for b in names {
            assert_eq!(name_similarity(a, b), name_similarity(b, a));
        }
    }
}

#[test]
fn test_repeated_attacks_count_per_entry() {
    assert_eq!(attack_overlap(["Tackle", "Tackle"], ["tackle", "growl"]), 1.0);
    assert_eq!(attack_overlap(["Tackle"], ["tackle", "tackle"]), 0.5);
    assert_eq!(attack_overlap(["Foul Play", "Foul Play"], ["foul play"]), 1.0);

    // A repeated entry on one side makes the ratio direction dependent
    assert_eq!(attack_overlap(["Growl"], ["growl", "growl", "tackle"]), 1.0 / 3.0);
    assert_eq!(attack_overlap(["growl", "growl", "tackle"], ["Growl"]), 2.0 / 3.0);
}

#[test]
fn test_ranking_is_stable_for_equal_scores() {
    let source = SourceRecord::new("sv1-81", "Pikachu");
    let listings: Vec<CandidateListing> = [909, 505, 707, 606]
        .into_iter()
        .map(|id| CandidateListing::new(id, "Pikachu [Thunder Shock]", ""))
        .collect();

    let selection = MatchSelector::default().select(&source, &listings, ACCEPT_THRESHOLD);
    let ids: Vec<u64> = selection.ranked.iter().map(|m| m.candidate.catalog_id).collect();
    assert_eq!(ids, vec![505, 606, 707, 909]);
    assert!(selection.best.is_none());
}

fn name_strategy() -> impl Strategy<Value = String> {
    ("[A-Za-z]{0,10}( [A-Za-z]{1,8})?", prop::option::of(prop::sample::select(vec!["ex", "V", "VMAX", "GX"])))
        .prop_map(|(base, suffix)| match suffix {
            Some(suffix) => format!("{} {}", base, suffix),
            None => base,
        })
}

fn attacks_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[A-Za-z]{1,8}( [A-Za-z]{1,8})?", 0..4)
}

fn listing_name(name: &str, attacks: &[String]) -> String {
    if attacks.is_empty() {
        name.to_string()
    } else {
        format!("{} [{}]", name, attacks.join(" | "))
    }
}

proptest! {
    #[test]
    fn property_score_stays_in_unit_interval(
        source_name in name_strategy(),
        source_attacks in attacks_strategy(),
        candidate_name in name_strategy(),
        candidate_attacks in attacks_strategy(),
    ) {
        let source = SourceRecord::new("sv2-1", source_name).with_attacks(source_attacks);
        let candidate = CandidateListing::new(1, listing_name(&candidate_name, &candidate_attacks), "");

        let score = ScoringEngine::new().score(&source, &candidate).score;
        prop_assert!((0.0..=1.0).contains(&score), "scored {}", score);
    }

    #[test]
    fn property_name_similarity_is_symmetric(a in name_strategy(), b in name_strategy()) {
        prop_assert_eq!(name_similarity(&a, &b), name_similarity(&b, &a));
    }

    #[test]
    fn property_attack_overlap_commutes_without_repeats(
        a in prop::collection::btree_set("[a-z]{1,6}", 0..5),
        b in prop::collection::btree_set("[a-z]{1,6}", 0..5),
    ) {
        let forward = attack_overlap(a.iter().map(String::as_str), b.iter().map(String::as_str));
        let backward = attack_overlap(b.iter().map(String::as_str), a.iter().map(String::as_str));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn property_missing_attacks_cap_score(
        source_name in name_strategy(),
        candidate_name in name_strategy(),
        candidate_attacks in attacks_strategy(),
    ) {
        let source = SourceRecord::new("sv2-1", source_name);
        let candidate = CandidateListing::new(1, listing_name(&candidate_name, &candidate_attacks), "");

        prop_assert!(ScoringEngine::new().score(&source, &candidate).score <= 0.3);
    }
}
