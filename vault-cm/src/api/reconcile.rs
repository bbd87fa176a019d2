//! Reconciliation run API handlers
//!
//! POST /reconcile/start, GET /reconcile/status/:run_id,
//! POST /reconcile/cancel/:run_id, GET /reconcile/runs,
//! DELETE /reconcile/progress/:run_key

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vault_common::events::VaultEvent;

use crate::error::{ApiError, ApiResult};
use crate::models::{ReconcileRun, RunParameters, RunReport, RunState, RunTotals};
use crate::services::{BatchRunner, SqliteProgressStore, SqliteRecordStore};
use crate::{ActiveRun, AppState};

/// POST /reconcile/start request
///
/// Every field is optional; missing ones come from the service defaults.
#[derive(Debug, Default, Deserialize)]
pub struct StartReconcileRequest {
    pub run_key: Option<String>,
    pub page_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub unclamped_batch_size: Option<bool>,
    pub batch_delay_ms: Option<u64>,
    pub checkpoint_every: Option<usize>,
    pub max_requests: Option<u64>,
    pub accept_threshold: Option<f64>,
    pub candidate_limit: Option<usize>,
    pub max_checkpoint_failures: Option<u32>,
}

impl StartReconcileRequest {
    /// Overlay the request on `base`
    pub fn apply(self, base: &RunParameters) -> RunParameters {
        RunParameters {
            run_key: self.run_key.unwrap_or_else(|| base.run_key.clone()),
            page_size: self.page_size.unwrap_or(base.page_size),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            unclamped_batch_size: self.unclamped_batch_size.unwrap_or(base.unclamped_batch_size),
            batch_delay_ms: self.batch_delay_ms.unwrap_or(base.batch_delay_ms),
            checkpoint_every: self.checkpoint_every.unwrap_or(base.checkpoint_every),
            max_requests: self.max_requests.unwrap_or(base.max_requests),
            accept_threshold: self.accept_threshold.unwrap_or(base.accept_threshold),
            candidate_limit: self.candidate_limit.unwrap_or(base.candidate_limit),
            max_checkpoint_failures: self.max_checkpoint_failures.unwrap_or(base.max_checkpoint_failures),
        }
    }
}

/// POST /reconcile/start response
#[derive(Debug, Serialize)]
pub struct StartReconcileResponse {
    pub run_id: Uuid,
    pub run_key: String,
    pub state: RunState,
    pub parameters: RunParameters,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /reconcile/status response
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub run_key: String,
    pub state: RunState,
    /// Background task still executing
    pub active: bool,
    pub totals: RunTotals,
    pub report: Option<RunReport>,
    pub last_error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_seconds: u64,
}

impl RunStatusResponse {
    fn from_run(run: ReconcileRun, active: bool) -> Self {
        Self {
            run_id: run.run_id,
            run_key: run.parameters.run_key.clone(),
            state: run.state,
            active,
            totals: run.totals,
            elapsed_seconds: run.elapsed_seconds(),
            report: run.report,
            last_error: run.last_error,
            started_at: run.started_at,
            ended_at: run.ended_at,
        }
    }
}

/// POST /reconcile/cancel response
#[derive(Debug, Serialize)]
pub struct CancelReconcileResponse {
    pub run_id: Uuid,
    pub state: RunState,
    /// True when a running task was signalled; it stops within one sub-batch
    pub cancel_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ResetProgressResponse {
    pub run_key: String,
    pub removed: bool,
}

/// POST /reconcile/start
///
/// Starts a background run. 409 when a run with the same key is active.
pub async fn start_reconcile(
    State(state): State<AppState>,
    body: Option<Json<StartReconcileRequest>>,
) -> ApiResult<Json<StartReconcileResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let params = request.apply(&state.run_defaults);
    params.validate().map_err(ApiError::BadRequest)?;

    let run = ReconcileRun::new(params.clone());
    let cancel = CancellationToken::new();

    {
        let mut active = state.active_runs.write().await;
        if active.values().any(|r| r.run_key == params.run_key) {
            return Err(ApiError::Conflict(format!(
                "Reconciliation already running for key '{}'",
                params.run_key
            )));
        }
        active.insert(
            run.run_id,
            ActiveRun {
                run_key: params.run_key.clone(),
                cancel: cancel.clone(),
            },
        );
    }

    if let Err(e) = crate::db::runs::save_run(&state.db, &run).await {
        state.active_runs.write().await.remove(&run.run_id);
        return Err(e.into());
    }

    info!(
        run_id = %run.run_id,
        run_key = %params.run_key,
        "Reconciliation run started and persisted to database"
    );

    let response = StartReconcileResponse {
        run_id: run.run_id,
        run_key: params.run_key.clone(),
        state: run.state,
        parameters: params,
        started_at: run.started_at,
    };

    tokio::spawn(execute_run(state, run, cancel));

    Ok(Json(response))
}

/// Background task: run the batch runner and keep `reconcile_runs` current
async fn execute_run(state: AppState, mut run: ReconcileRun, cancel: CancellationToken) {
    let run_id = run.run_id;

    // Subscribe before the runner emits anything
    let rx = state.event_bus.subscribe();
    let tracker_done = CancellationToken::new();
    let tracker = tokio::spawn(track_run(
        state.db.clone(),
        rx,
        run.clone(),
        tracker_done.clone(),
    ));

    let runner = BatchRunner::new(
        Arc::new(SqliteRecordStore::new(state.db.clone())),
        state.catalog.clone(),
        Arc::new(SqliteProgressStore::new(state.db.clone())),
        state.resolver.clone(),
        state.event_bus.clone(),
    );

    let report = match runner.run(run_id, &run.parameters, cancel).await {
        Ok(report) => report,
        Err(aborted) => {
            state
                .set_last_error(format!("Run {} aborted: {}", run_id, aborted.error))
                .await;
            *aborted.report
        }
    };

    tracker_done.cancel();
    if let Err(e) = tracker.await {
        warn!(run_id = %run_id, error = %e, "Run tracker task failed");
    }

    run.finish(report);
    if let Err(e) = crate::db::runs::save_run(&state.db, &run).await {
        error!(run_id = %run_id, error = %e, "Failed to persist final run state");
        state.set_last_error(format!("Failed to persist run {}: {}", run_id, e)).await;
    }

    state.active_runs.write().await.remove(&run_id);
    info!(run_id = %run_id, state = run.state.as_str(), "Background reconciliation task finished");
}

/// Mirror state changes and progress of one run into the database
async fn track_run(
    db: sqlx::SqlitePool,
    mut rx: tokio::sync::broadcast::Receiver<VaultEvent>,
    mut run: ReconcileRun,
    done: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            received = rx.recv() => received,
            _ = done.cancelled() => break,
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(run_id = %run.run_id, skipped, "Run tracker lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if event.run_id() != run.run_id {
            continue;
        }

        let changed = match event {
            VaultEvent::ReconcileStateChanged { new_state, .. } => {
                // Terminal state is written with the report
                if new_state.is_terminal() {
                    false
                } else {
                    run.transition_to(new_state);
                    true
                }
            }
            VaultEvent::ReconcileProgress { totals, .. } => {
                run.totals = totals;
                true
            }
            _ => false,
        };

        if changed {
            if let Err(e) = crate::db::runs::save_run(&db, &run).await {
                warn!(run_id = %run.run_id, error = %e, "Failed to persist run progress");
            }
        }
    }
}

/// GET /reconcile/status/:run_id
pub async fn get_reconcile_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunStatusResponse>> {
    let run = crate::db::runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Reconciliation run not found: {}", run_id)))?;

    let active = state.active_runs.read().await.contains_key(&run_id);
    debug!(run_id = %run_id, state = run.state.as_str(), active, "Status query");

    Ok(Json(RunStatusResponse::from_run(run, active)))
}

/// POST /reconcile/cancel/:run_id
///
/// Signals the run's cancellation token. The run stops before its next
/// sub-batch and reports CANCELLED through the status endpoint.
pub async fn cancel_reconcile(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<CancelReconcileResponse>> {
    let active = state.active_runs.read().await.get(&run_id).cloned();
    if let Some(active) = active {
        active.cancel.cancel();
        info!(run_id = %run_id, "Cancellation requested");

        let current = crate::db::runs::load_run(&state.db, run_id)
            .await?
            .map(|r| r.state)
            .unwrap_or(RunState::Idle);

        return Ok(Json(CancelReconcileResponse {
            run_id,
            state: current,
            cancel_requested: true,
        }));
    }

    let mut run = crate::db::runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Reconciliation run not found: {}", run_id)))?;

    if run.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Reconciliation run already in terminal state: {}",
            run.state.as_str()
        )));
    }

    // Persisted as running but no task owns it
    run.transition_to(RunState::Cancelled);
    crate::db::runs::save_run(&state.db, &run).await?;
    warn!(run_id = %run_id, "Cancelled orphaned run record");

    Ok(Json(CancelReconcileResponse {
        run_id,
        state: run.state,
        cancel_requested: false,
    }))
}

/// GET /reconcile/runs
pub async fn list_reconcile_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<RunStatusResponse>>> {
    let runs = crate::db::runs::list_runs(&state.db, query.limit.clamp(1, 500)).await?;
    let active = state.active_runs.read().await;

    Ok(Json(
        runs.into_iter()
            .map(|run| {
                let is_active = active.contains_key(&run.run_id);
                RunStatusResponse::from_run(run, is_active)
            })
            .collect(),
    ))
}

/// DELETE /reconcile/progress/:run_key
///
/// Forgets the processed-id set so the next run rescans everything.
pub async fn reset_reconcile_progress(
    State(state): State<AppState>,
    Path(run_key): Path<String>,
) -> ApiResult<Json<ResetProgressResponse>> {
    if state.active_runs.read().await.values().any(|r| r.run_key == run_key) {
        return Err(ApiError::Conflict(format!(
            "Cannot reset progress while a run is active for key '{}'",
            run_key
        )));
    }

    let removed = crate::db::progress::reset_progress(&state.db, &run_key).await?;
    info!(run_key = %run_key, removed, "Reconciliation progress reset");

    Ok(Json(ResetProgressResponse { run_key, removed }))
}

/// Build reconciliation routes
pub fn reconcile_routes() -> Router<AppState> {
    Router::new()
        .route("/reconcile/start", post(start_reconcile))
        .route("/reconcile/status/:run_id", get(get_reconcile_status))
        .route("/reconcile/cancel/:run_id", post(cancel_reconcile))
        .route("/reconcile/runs", get(list_reconcile_runs))
        .route("/reconcile/progress/:run_key", delete(reset_reconcile_progress))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_overlays_defaults() {
        let base = RunParameters {
            max_requests: 50,
            ..RunParameters::default()
        };
        let request = StartReconcileRequest {
            batch_size: Some(6),
            run_key: Some("nightly".to_string()),
            ..StartReconcileRequest::default()
        };

        let params = request.apply(&base);
        assert_eq!(params.batch_size, 6);
        assert_eq!(params.run_key, "nightly");
        assert_eq!(params.max_requests, 50);
        assert_eq!(params.page_size, base.page_size);
    }
}
