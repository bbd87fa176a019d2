//! Settings database operations
//!
//! Get/set accessors over the shared `settings` key-value table.

use sqlx::{Pool, Sqlite};
use vault_common::{Error, Result};

/// Settings key holding the catalog API key
pub const CATALOG_API_KEY: &str = "catalog_api_key";

/// Get catalog API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_catalog_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, CATALOG_API_KEY).await
}

/// Set catalog API key in database
pub async fn set_catalog_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, CATALOG_API_KEY, key).await
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        vault_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_api_key_round_trip() {
        let pool = setup_test_db().await;
        assert_eq!(get_catalog_api_key(&pool).await.unwrap(), None);

        set_catalog_api_key(&pool, "key-1".to_string()).await.unwrap();
        set_catalog_api_key(&pool, "key-2".to_string()).await.unwrap();
        assert_eq!(get_catalog_api_key(&pool).await.unwrap(), Some("key-2".to_string()));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('reconcile_max_requests', 'lots')")
            .execute(&pool)
            .await
            .unwrap();

        let parsed = get_setting::<u64>(&pool, "reconcile_max_requests").await;
        assert!(matches!(parsed, Err(Error::Config(_))));
    }
}
