//! Card record database operations
//!
//! Records are read in id order so paging is stable while write-back runs.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use vault_common::{Error, Result};

use crate::models::SourceRecord;
use crate::utils::{lock_wait_ms, retry_on_lock};

/// Fetch one page of records ordered by id
pub async fn fetch_page(pool: &SqlitePool, offset: usize, limit: usize) -> Result<Vec<SourceRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, attacks, cardmarket_url, cardmarket_id, set_code, number
        FROM discovered_cards
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_record).collect())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> SourceRecord {
    let id: String = row.get("id");
    let attacks: String = row.get("attacks");
    let attacks = serde_json::from_str::<Vec<String>>(&attacks).unwrap_or_else(|e| {
        tracing::warn!(record_id = %id, error = %e, "Unreadable attack list, treating as empty");
        Vec::new()
    });

    SourceRecord {
        name: row.get("name"),
        attacks,
        catalog_url: row.get("cardmarket_url"),
        catalog_id: row.get::<Option<i64>, _>("cardmarket_id").map(|v| v as u64),
        set_code: row.get("set_code"),
        number: row.get("number"),
        id,
    }
}

/// Load a single record
pub async fn load_record(pool: &SqlitePool, id: &str) -> Result<Option<SourceRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, attacks, cardmarket_url, cardmarket_id, set_code, number
        FROM discovered_cards
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_record))
}

/// Insert or replace a record
pub async fn upsert_record(pool: &SqlitePool, record: &SourceRecord) -> Result<()> {
    let attacks = serde_json::to_string(&record.attacks)
        .map_err(|e| Error::Internal(format!("Failed to serialize attacks: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO discovered_cards (id, name, attacks, cardmarket_url, cardmarket_id, set_code, number, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            attacks = excluded.attacks,
            cardmarket_url = excluded.cardmarket_url,
            cardmarket_id = excluded.cardmarket_id,
            set_code = excluded.set_code,
            number = excluded.number,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(attacks)
    .bind(&record.catalog_url)
    .bind(record.catalog_id.map(|v| v as i64))
    .bind(&record.set_code)
    .bind(&record.number)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write a resolved reference back to a record
///
/// Idempotent: writing the same reference twice leaves the row unchanged
/// apart from `updated_at`. Unknown ids are reported as `NotFound`.
pub async fn write_reference(pool: &SqlitePool, id: &str, catalog_id: u64, url: &str) -> Result<()> {
    let max_wait_ms = lock_wait_ms(pool).await;
    let updated_at = Utc::now().to_rfc3339();

    let affected = retry_on_lock("write_reference", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE discovered_cards
            SET cardmarket_url = ?, cardmarket_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(url)
        .bind(catalog_id as i64)
        .bind(&updated_at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    })
    .await?;

    if affected == 0 {
        return Err(Error::NotFound(format!("Card record {}", id)));
    }
    Ok(())
}

/// Total number of records
pub async fn count_records(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discovered_cards")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
