//! Database access for vault-cm
//!
//! Tables owned by this service:
//! - `discovered_cards`: local card records (read by page, written back by id)
//! - `cardmarket_singles`: local mirror of the CardMarket singles catalog
//! - `reconcile_progress`: resumable progress, one JSON row per run key
//! - `reconcile_runs`: run history polled by the status endpoint

pub mod catalog;
pub mod progress;
pub mod records;
pub mod runs;
pub mod settings;

use sqlx::SqlitePool;
use std::path::Path;
use vault_common::Result;

/// Open the shared database and create vault-cm tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = vault_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create vault-cm tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discovered_cards (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            attacks TEXT NOT NULL DEFAULT '[]',
            cardmarket_url TEXT,
            cardmarket_id INTEGER,
            set_code TEXT,
            number TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cardmarket_singles (
            id_product INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            id_category INTEGER,
            category_name TEXT,
            id_expansion INTEGER,
            id_metacard INTEGER,
            date_added TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cardmarket_singles_name ON cardmarket_singles(name)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconcile_progress (
            run_key TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconcile_runs (
            run_id TEXT PRIMARY KEY,
            run_key TEXT NOT NULL,
            state TEXT NOT NULL,
            parameters TEXT NOT NULL,
            totals TEXT NOT NULL,
            report TEXT,
            last_error TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (discovered_cards, cardmarket_singles, reconcile_progress, reconcile_runs)"
    );

    Ok(())
}
