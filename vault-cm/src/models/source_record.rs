//! Local card records awaiting a catalog identity

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Leading set code of a card id: `sv8-123` → `sv8`, `rsv10pt5-1` → `rsv10pt5`
static SET_CODE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z]+\d*(?:pt\d+)?)").expect("set code pattern is valid")
});

/// A locally held card record
///
/// Identity is the stable `id`; `name` and `attacks` are free text and
/// neither unique nor stable across data sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable local id (`<set code>-<number>` for imported cards)
    pub id: String,

    /// Display name, e.g. "Charizard ex"
    pub name: String,

    /// Attack names in card order; empty when the source had none
    #[serde(default)]
    pub attacks: Vec<String>,

    /// Current catalog link or id. Doubles as the unreliable hint on input
    /// and the resolved canonical URL after write-back.
    #[serde(default)]
    pub catalog_url: Option<String>,

    /// Resolved numeric catalog id (set by write-back)
    #[serde(default)]
    pub catalog_id: Option<u64>,

    /// Expansion short code; falls back to the id prefix when absent
    #[serde(default)]
    pub set_code: Option<String>,

    /// Collector number within the expansion
    #[serde(default)]
    pub number: Option<String>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attacks: Vec::new(),
            catalog_url: None,
            catalog_id: None,
            set_code: None,
            number: None,
        }
    }

    pub fn with_attacks<I, S>(mut self, attacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attacks = attacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = Some(url.into());
        self
    }

    pub fn with_set_code(mut self, code: impl Into<String>) -> Self {
        self.set_code = Some(code.into());
        self
    }

    /// Expansion code, lowercased
    ///
    /// Uses the explicit set code when present, else the id prefix.
    pub fn expansion_code(&self) -> Option<String> {
        if let Some(code) = self.set_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            return Some(code.to_lowercase());
        }
        SET_CODE_PREFIX
            .captures(&self.id)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
    }

    /// Attack names with blanks removed
    pub fn attack_names(&self) -> impl Iterator<Item = &str> {
        self.attacks.iter().map(|a| a.trim()).filter(|a| !a.is_empty())
    }
}
