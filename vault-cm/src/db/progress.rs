//! Reconciliation progress persistence
//!
//! One row per run key holding the JSON-encoded `ProgressState`.

use chrono::Utc;
use sqlx::SqlitePool;
use vault_common::{Error, Result};

use crate::models::ProgressState;
use crate::utils::{lock_wait_ms, retry_on_lock};

/// Load progress for a run key; an unknown key yields empty progress
pub async fn load_progress(pool: &SqlitePool, run_key: &str) -> Result<ProgressState> {
    let row: Option<(String,)> = sqlx::query_as("SELECT state FROM reconcile_progress WHERE run_key = ?")
        .bind(run_key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some((state,)) => serde_json::from_str(&state)
            .map_err(|e| Error::Internal(format!("Failed to deserialize progress for {}: {}", run_key, e))),
        None => Ok(ProgressState::default()),
    }
}

/// Save progress for a run key (insert or replace)
pub async fn save_progress(pool: &SqlitePool, run_key: &str, state: &ProgressState) -> Result<()> {
    let json = serde_json::to_string(state)
        .map_err(|e| Error::Internal(format!("Failed to serialize progress: {}", e)))?;
    let updated_at = Utc::now().to_rfc3339();
    let max_wait_ms = lock_wait_ms(pool).await;

    retry_on_lock("save_progress", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO reconcile_progress (run_key, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(run_key) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run_key)
        .bind(&json)
        .bind(&updated_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Forget all progress for a run key
pub async fn reset_progress(pool: &SqlitePool, run_key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reconcile_progress WHERE run_key = ?")
        .bind(run_key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
