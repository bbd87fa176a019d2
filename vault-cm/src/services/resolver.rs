//! Identifier Resolver
//!
//! Turns either an identifier already embedded in a record, or an accepted
//! match, into a canonical CardMarket reference:
//!
//! `https://www.cardmarket.com/fr/Pokemon/Products/Singles/<slug>/<id>?language=2`
//!
//! Embedded identifiers always take precedence over scoring.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ReconcileError;
use crate::models::{MatchResult, ReferenceSource, SourceRecord};

/// Prefix of every canonical single-card URL
pub const CANONICAL_URL_BASE: &str = "https://www.cardmarket.com/fr/Pokemon/Products/Singles";

/// Query string appended to built URLs
pub const CANONICAL_URL_QUERY: &str = "language=2";

/// `/Singles/<slug>/<digits>?`
static CANONICAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Singles/[^/]+/(\d+)\?").expect("canonical url pattern is valid"));

/// `https://www.tcggo.com/external/cm/<digits>`
static REDIRECT_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"/cm/(\d+)").expect("redirect url pattern is valid"));

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("bare id pattern is valid"));

/// Built-in expansion code → CardMarket slug table
const BUILTIN_SLUGS: &[(&str, &str)] = &[
    // Scarlet & Violet
    ("sv1", "Scarlet-Violet"),
    ("sv2", "Paldea-Evolved"),
    ("sv3", "Obsidian-Flames"),
    ("sv3pt5", "151"),
    ("sv4", "Paradox-Rift"),
    ("sv4pt5", "Paldean-Fates"),
    ("sv5", "Temporal-Forces"),
    ("sv6", "Twilight-Masquerade"),
    ("sv6pt5", "Shrouded-Fable"),
    ("sv7", "Stellar-Crown"),
    ("sv8", "Surging-Sparks"),
    ("sv8pt5", "Prismatic-Evolutions"),
    ("sv9", "Journey-Together"),
    ("sv10", "Destined-Rivals"),
    ("svp", "SV-Black-Star-Promos"),
    // 10.5 split sets
    ("rsv10pt5", "White-Flare"),
    ("zsv10pt5", "Black-Bolt"),
    // Mega Evolution
    ("me1", "Mega-Evolution"),
    ("me2", "Mega-Evolution-2"),
    ("mep", "Mega-Evolution-Promos"),
    // Sword & Shield
    ("swsh1", "Sword-Shield-Base-Set"),
    ("swsh2", "Rebel-Clash"),
    ("swsh3", "Darkness-Ablaze"),
    ("swsh4", "Vivid-Voltage"),
    ("swsh5", "Battle-Styles"),
    ("swsh6", "Chilling-Reign"),
    ("swsh7", "Evolving-Skies"),
    ("swsh8", "Fusion-Strike"),
    ("swsh9", "Brilliant-Stars"),
    ("swsh10", "Astral-Radiance"),
    ("swsh11", "Lost-Origin"),
    ("swsh12", "Silver-Tempest"),
    ("swsh12pt5", "Crown-Zenith"),
    ("swshp", "SWSH-Black-Star-Promos"),
];

/// Expansion code → slug mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionSlugs {
    slugs: BTreeMap<String, String>,
}

impl Default for ExpansionSlugs {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExpansionSlugs {
    pub fn builtin() -> Self {
        Self {
            slugs: BUILTIN_SLUGS
                .iter()
                .map(|(code, slug)| (code.to_string(), slug.to_string()))
                .collect(),
        }
    }

    /// Add or replace mappings (TOML `[expansions]`); codes are lowercased
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (code, slug) in overrides {
            let code = code.trim().to_lowercase();
            let slug = slug.trim();
            if !code.is_empty() && !slug.is_empty() {
                self.slugs.insert(code, slug.to_string());
            }
        }
        self
    }

    pub fn slug(&self, code: &str) -> Option<&str> {
        self.slugs.get(&code.to_lowercase()).map(String::as_str)
    }

    /// Human-readable expansion name: `Paldea-Evolved` → `Paldea Evolved`
    pub fn display_name(&self, code: &str) -> Option<String> {
        self.slug(code).map(slug_display_name)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// Title-case the hyphen-separated words of a slug
pub fn slug_display_name(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a URL is already in canonical `/Singles/<slug>/<id>?` form
pub fn is_canonical_url(url: &str) -> bool {
    CANONICAL_URL.is_match(url)
}

/// An identifier embedded in a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectIdentifier {
    /// Already canonical; used unchanged
    CanonicalUrl { url: String, catalog_id: u64 },
    /// Redirect link carrying the product id (`.../external/cm/<id>`)
    RedirectUrl { catalog_id: u64 },
    /// Bare numeric product id
    ProductId(u64),
}

impl DirectIdentifier {
    /// Recognize an embedded hint; anything else yields `None`
    pub fn parse(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }

        if let Some(id) = capture_id(&CANONICAL_URL, hint) {
            return Some(DirectIdentifier::CanonicalUrl {
                url: hint.to_string(),
                catalog_id: id,
            });
        }
        if let Some(id) = capture_id(&REDIRECT_URL, hint) {
            return Some(DirectIdentifier::RedirectUrl { catalog_id: id });
        }
        if BARE_ID.is_match(hint) {
            return hint.parse().ok().map(DirectIdentifier::ProductId);
        }
        None
    }

    pub fn catalog_id(&self) -> u64 {
        match self {
            DirectIdentifier::CanonicalUrl { catalog_id, .. }
            | DirectIdentifier::RedirectUrl { catalog_id }
            | DirectIdentifier::ProductId(catalog_id) => *catalog_id,
        }
    }
}

fn capture_id(pattern: &Regex, text: &str) -> Option<u64> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical external reference for a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogReference {
    pub catalog_id: u64,
    pub url: String,
    pub source: ReferenceSource,
    /// Match score; `None` for direct identifiers
    pub score: Option<f64>,
}

/// Identifier resolver
#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    slugs: ExpansionSlugs,
}

impl IdentifierResolver {
    pub fn new(slugs: ExpansionSlugs) -> Self {
        Self { slugs }
    }

    pub fn slugs(&self) -> &ExpansionSlugs {
        &self.slugs
    }

    /// Embedded identifier of a record, if it carries one
    ///
    /// Checks the stored link first, then a stored numeric id.
    pub fn direct_identifier(&self, record: &SourceRecord) -> Option<DirectIdentifier> {
        record
            .catalog_url
            .as_deref()
            .and_then(DirectIdentifier::parse)
            .or_else(|| record.catalog_id.map(DirectIdentifier::ProductId))
    }

    /// Whether the record already holds a canonical reference and can be skipped
    pub fn is_resolved(&self, record: &SourceRecord) -> bool {
        record.catalog_url.as_deref().is_some_and(is_canonical_url)
    }

    /// Resolve a record to a canonical reference
    ///
    /// Direct identifiers win over `matched`; without either the result is
    /// `NoMatch`.
    pub fn resolve(
        &self,
        record: &SourceRecord,
        matched: Option<&MatchResult>,
    ) -> Result<CatalogReference, ReconcileError> {
        if let Some(direct) = self.direct_identifier(record) {
            return self.resolve_direct(record, &direct);
        }

        match matched {
            Some(m) => Ok(CatalogReference {
                catalog_id: m.candidate.catalog_id,
                url: self.build_url(record, m.candidate.catalog_id)?,
                source: ReferenceSource::Matched,
                score: Some(m.score),
            }),
            None => Err(ReconcileError::NoMatch { best_score: 0.0 }),
        }
    }

    pub fn resolve_direct(
        &self,
        record: &SourceRecord,
        direct: &DirectIdentifier,
    ) -> Result<CatalogReference, ReconcileError> {
        let url = match direct {
            DirectIdentifier::CanonicalUrl { url, .. } => url.clone(),
            other => self.build_url(record, other.catalog_id())?,
        };

        Ok(CatalogReference {
            catalog_id: direct.catalog_id(),
            url,
            source: ReferenceSource::Direct,
            score: None,
        })
    }

    /// Canonical URL for a product id in the record's expansion
    pub fn build_url(&self, record: &SourceRecord, catalog_id: u64) -> Result<String, ReconcileError> {
        let code = record.expansion_code();
        let slug = code
            .as_deref()
            .and_then(|c| self.slugs.slug(c))
            .ok_or_else(|| ReconcileError::UnmappedExpansion { code: code.clone() })?;

        Ok(format!(
            "{CANONICAL_URL_BASE}/{slug}/{catalog_id}?{CANONICAL_URL_QUERY}"
        ))
    }
}
