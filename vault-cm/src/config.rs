//! Configuration resolution for vault-cm
//!
//! Provides multi-tier catalog API key resolution with Database → ENV → TOML
//! priority, and write-back of the key to the TOML file.

use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{info, warn};
use vault_common::config::{load_toml_config, write_toml_config, TomlConfig};
use vault_common::{Error, Result};

/// Environment variable holding the catalog API key
pub const CATALOG_API_KEY_ENV: &str = "VAULTESTIM_CATALOG_API_KEY";

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

/// Resolve the catalog API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_catalog_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<(String, KeySource)> {
    let db_key = crate::db::settings::get_catalog_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(CATALOG_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.catalog.api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| KeySource::Database.as_str()),
        env_key.as_ref().map(|_| KeySource::Environment.as_str()),
        toml_key.as_ref().map(|_| KeySource::Toml.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Catalog API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let resolved = db_key
        .map(|k| (k, KeySource::Database))
        .or_else(|| env_key.map(|k| (k, KeySource::Environment)))
        .or_else(|| toml_key.map(|k| (k, KeySource::Toml)));

    match resolved {
        Some((key, source)) => {
            info!("Catalog API key loaded from {}", source.as_str());
            Ok((key, source))
        }
        None => Err(Error::Config(format!(
            "Catalog API key not configured. Please configure using one of:\n\
             1. API: POST /api/settings/catalog_api_key\n\
             2. Environment: {}=your-key-here\n\
             3. TOML config: [catalog] api_key = \"your-key\"",
            CATALOG_API_KEY_ENV
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store the catalog API key in the TOML file, keeping other settings
///
/// Best-effort: a write failure is logged and ignored, the database copy is
/// authoritative.
pub fn sync_api_key_to_toml(key: &str, toml_path: &Path) -> Result<()> {
    let mut config = if toml_path.exists() {
        load_toml_config(toml_path)?
    } else {
        TomlConfig::default()
    };

    config.catalog.api_key = Some(key.to_string());

    match write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!("Catalog API key synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(())
        }
    }
}

/// Copy a key found in ENV or TOML into the database
///
/// An environment key is also written to TOML as a backup.
pub async fn migrate_key_to_database(
    key: &str,
    source: KeySource,
    db: &Pool<Sqlite>,
    toml_path: Option<&Path>,
) -> Result<()> {
    if source == KeySource::Database {
        return Ok(());
    }

    crate::db::settings::set_catalog_api_key(db, key.to_string()).await?;

    if source == KeySource::Environment {
        if let Some(path) = toml_path {
            sync_api_key_to_toml(key, path)?;
        }
    }

    info!("Catalog API key migrated from {} to database", source.as_str());
    Ok(())
}
