//! Catalog listings considered as match candidates
//!
//! Catalog display names embed the card's attacks, e.g.
//! `Amoonguss [Sporprise | Rising Lunge]`. The attack segment is parsed once
//! when the listing is built so scoring never deals with raw names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ATTACK_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("attack segment pattern is valid"));

/// One external catalog entry, normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateListing {
    /// Catalog product id
    pub catalog_id: u64,

    /// Display name exactly as the catalog returned it
    pub name: String,

    /// Display name without the bracketed attack segment
    pub card_name: String,

    /// Attack names from the bracketed segment, trimmed and lowercased
    pub attacks: Vec<String>,

    /// Catalog expansion/category reference (empty when the catalog omitted it)
    pub expansion: String,
}

impl CandidateListing {
    pub fn new(catalog_id: u64, name: impl Into<String>, expansion: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            catalog_id,
            card_name: strip_attack_segment(&name),
            attacks: parse_attack_list(&name),
            name,
            expansion: expansion.into(),
        }
    }
}

/// Attack names from the first bracketed, pipe-delimited segment
///
/// A name without brackets yields an empty list.
pub fn parse_attack_list(name: &str) -> Vec<String> {
    ATTACK_SEGMENT
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|segment| {
            segment
                .as_str()
                .split('|')
                .map(|attack| attack.trim().to_lowercase())
                .filter(|attack| !attack.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Display name with bracketed segments removed and whitespace collapsed
pub fn strip_attack_segment(name: &str) -> String {
    ATTACK_SEGMENT
        .replace_all(name, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attack_list() {
        assert_eq!(
            parse_attack_list("Amoonguss [Sporprise | Rising Lunge]"),
            vec!["sporprise", "rising lunge"]
        );
        assert_eq!(parse_attack_list("Amoonguss [Foul Play] ex"), vec!["foul play"]);
    }

    #[test]
    fn test_missing_brackets_is_empty_not_error() {
        assert!(parse_attack_list("Amoonguss").is_empty());
        assert!(parse_attack_list("Amoonguss [unterminated").is_empty());
        assert!(parse_attack_list("Amoonguss [ | ]").is_empty());
        assert!(parse_attack_list("").is_empty());
    }

    #[test]
    fn test_card_name_drops_attack_segment() {
        assert_eq!(strip_attack_segment("Amoonguss [Sporprise | Rising Lunge]"), "Amoonguss");
        assert_eq!(strip_attack_segment("Amoonguss [Foul Play] ex"), "Amoonguss ex");
        assert_eq!(strip_attack_segment("  Pikachu   V "), "Pikachu V");
    }

    #[test]
    fn test_listing_construction() {
        let listing = CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", "");
        assert_eq!(listing.catalog_id, 101);
        assert_eq!(listing.card_name, "Amoonguss");
        assert_eq!(listing.attacks.len(), 2);
        assert_eq!(listing.name, "Amoonguss [Sporprise | Rising Lunge]");
    }
}
