//! Reconciliation run persistence
//!
//! Runs are upserted on every state change so the status endpoint can be
//! polled while the run is in flight.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vault_common::{Error, Result};

use crate::models::{ReconcileRun, RunParameters, RunReport, RunState, RunTotals};
use crate::utils::{lock_wait_ms, retry_on_lock};

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", what, e)))
}

fn parse_time(value: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", what, e)))
}

/// Save run to database
pub async fn save_run(pool: &SqlitePool, run: &ReconcileRun) -> Result<()> {
    // Prepare all data before acquiring a connection
    let run_id = run.run_id.to_string();
    let state = run.state.as_str();
    let parameters = to_json(&run.parameters, "parameters")?;
    let totals = to_json(&run.totals, "totals")?;
    let report = run.report.as_ref().map(|r| to_json(r, "report")).transpose()?;
    let started_at = run.started_at.to_rfc3339();
    let ended_at = run.ended_at.map(|dt| dt.to_rfc3339());
    let max_wait_ms = lock_wait_ms(pool).await;

    retry_on_lock("save_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO reconcile_runs (
                run_id, run_key, state, parameters, totals, report,
                last_error, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                totals = excluded.totals,
                report = excluded.report,
                last_error = excluded.last_error,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(&run.parameters.run_key)
        .bind(state)
        .bind(&parameters)
        .bind(&totals)
        .bind(&report)
        .bind(&run.last_error)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load run from database
pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<ReconcileRun>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, state, parameters, totals, report, last_error, started_at, ended_at
        FROM reconcile_runs
        WHERE run_id = ?
        "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.get("state");
    let state: RunState = from_json(&format!("\"{}\"", state), "state")?;
    let parameters: RunParameters = from_json(&row.get::<String, _>("parameters"), "parameters")?;
    let totals: RunTotals = from_json(&row.get::<String, _>("totals"), "totals")?;
    let report: Option<RunReport> = row
        .get::<Option<String>, _>("report")
        .map(|r| from_json(&r, "report"))
        .transpose()?;
    let started_at = parse_time(&row.get::<String, _>("started_at"), "started_at")?;
    let ended_at = row
        .get::<Option<String>, _>("ended_at")
        .map(|s| parse_time(&s, "ended_at"))
        .transpose()?;

    Ok(Some(ReconcileRun {
        run_id,
        state,
        parameters,
        totals,
        report,
        last_error: row.get("last_error"),
        started_at,
        ended_at,
    }))
}

/// Most recent runs, newest first
pub async fn list_runs(pool: &SqlitePool, limit: usize) -> Result<Vec<ReconcileRun>> {
    let ids: Vec<(String,)> = sqlx::query_as("SELECT run_id FROM reconcile_runs ORDER BY started_at DESC LIMIT ?")
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    let mut runs = Vec::with_capacity(ids.len());
    for (id,) in ids {
        let run_id = Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Bad run id {}: {}", id, e)))?;
        if let Some(run) = load_run(pool, run_id).await? {
            runs.push(run);
        }
    }
    Ok(runs)
}

/// Mark runs left non-terminal by a previous process as aborted
///
/// Called at startup; a run cannot survive a restart, only its progress can.
pub async fn abort_stale_runs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE reconcile_runs
        SET state = 'ABORTED',
            last_error = 'Service restarted while run was active',
            ended_at = ?
        WHERE state NOT IN ('DONE', 'CANCELLED', 'QUOTA_EXHAUSTED', 'ABORTED')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
