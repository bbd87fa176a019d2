//! Database initialization tests

use tempfile::TempDir;
use vault_common::db::init::{get_setting, init_database, set_setting};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data").join("vaultestim.db");
    assert!(!db_path.exists());

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists(), "Database file was not created");

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(tables, vec!["schema_version".to_string(), "settings".to_string()]);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("vaultestim.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "catalog_api_key", "abc").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(
        get_setting(&pool, "catalog_api_key").await.unwrap().as_deref(),
        Some("abc")
    );
}

#[tokio::test]
async fn test_set_setting_overwrites() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("vaultestim.db")).await.unwrap();

    set_setting(&pool, "k", "one").await.unwrap();
    set_setting(&pool, "k", "two").await.unwrap();
    assert_eq!(get_setting(&pool, "k").await.unwrap().as_deref(), Some("two"));
    assert_eq!(get_setting(&pool, "missing").await.unwrap(), None);
}
