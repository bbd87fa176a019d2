//! Catalog API key resolution tests
//!
//! Tests touching `VAULTESTIM_CATALOG_API_KEY` run serially.

use serial_test::serial;
use std::env;
use tempfile::TempDir;

use vault_cm::config::{
    migrate_key_to_database, resolve_catalog_api_key, sync_api_key_to_toml, KeySource, CATALOG_API_KEY_ENV,
};
use vault_cm::db;
use vault_common::config::{load_toml_config, TomlConfig};

async fn create_test_db() -> (TempDir, sqlx::SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = db::init_database_pool(&dir.path().join("vaultestim.db")).await.unwrap();
    (dir, pool)
}

fn toml_with_key(key: &str) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.catalog.api_key = Some(key.to_string());
    config
}

#[tokio::test]
#[serial]
async fn test_database_key_wins() {
    let (_dir, pool) = create_test_db().await;
    db::settings::set_catalog_api_key(&pool, "db-key".to_string()).await.unwrap();
    env::set_var(CATALOG_API_KEY_ENV, "env-key");

    let resolved = resolve_catalog_api_key(&pool, &toml_with_key("toml-key")).await.unwrap();

    env::remove_var(CATALOG_API_KEY_ENV);
    assert_eq!(resolved, ("db-key".to_string(), KeySource::Database));
}

#[tokio::test]
#[serial]
async fn test_environment_before_toml() {
    let (_dir, pool) = create_test_db().await;
    env::set_var(CATALOG_API_KEY_ENV, "env-key");

    let resolved = resolve_catalog_api_key(&pool, &toml_with_key("toml-key")).await.unwrap();

    env::remove_var(CATALOG_API_KEY_ENV);
    assert_eq!(resolved, ("env-key".to_string(), KeySource::Environment));
}

#[tokio::test]
#[serial]
async fn test_toml_key_and_blank_values() {
    let (_dir, pool) = create_test_db().await;
    env::set_var(CATALOG_API_KEY_ENV, "   ");

    let resolved = resolve_catalog_api_key(&pool, &toml_with_key("toml-key")).await.unwrap();
    assert_eq!(resolved, ("toml-key".to_string(), KeySource::Toml));

    let missing = resolve_catalog_api_key(&pool, &TomlConfig::default()).await;
    env::remove_var(CATALOG_API_KEY_ENV);
    assert!(matches!(missing, Err(vault_common::Error::Config(_))));
}

#[tokio::test]
#[serial]
async fn test_environment_key_migrates_to_database_and_toml() {
    let (dir, pool) = create_test_db().await;
    let toml_path = dir.path().join("vault-cm.toml");

    migrate_key_to_database("env-key", KeySource::Environment, &pool, Some(&toml_path))
        .await
        .unwrap();

    let stored = db::settings::get_catalog_api_key(&pool).await.unwrap();
    assert_eq!(stored.as_deref(), Some("env-key"));

    let written = load_toml_config(&toml_path).unwrap();
    assert_eq!(written.catalog.api_key.as_deref(), Some("env-key"));
}

#[test]
fn test_sync_keeps_other_settings() {
    let dir = TempDir::new().unwrap();
    let toml_path = dir.path().join("vault-cm.toml");
    std::fs::write(
        &toml_path,
        "root_folder = \"/srv/vaultestim\"\n\n[logging]\nlevel = \"debug\"\n\n[expansions]\nsv9 = \"Journey-Together\"\n",
    )
    .unwrap();

    sync_api_key_to_toml("new-key", &toml_path).unwrap();

    let config = load_toml_config(&toml_path).unwrap();
    assert_eq!(config.catalog.api_key.as_deref(), Some("new-key"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.expansions.get("sv9").map(String::as_str), Some("Journey-Together"));
    assert_eq!(config.root_folder.as_deref(), Some(std::path::Path::new("/srv/vaultestim")));
}
