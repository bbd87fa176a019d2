//! Manual match endpoint
//!
//! POST /match runs one lookup with the permissive review threshold and
//! returns the full ranking. Nothing is written back.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult, ReconcileError};
use crate::models::{MatchResult, SourceRecord, REVIEW_THRESHOLD};
use crate::services::scoring::base_name_query;
use crate::services::{CatalogReference, MatchSelector, QuotaBudget};
use crate::AppState;

/// Ranked candidates returned at most
const MAX_RANKED: usize = 20;

/// POST /match request
///
/// Either an inline `record` or the id of a stored one.
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub record: Option<SourceRecord>,
    pub record_id: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub limit: Option<usize>,
}

fn default_threshold() -> f64 {
    REVIEW_THRESHOLD
}

/// POST /match response
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub record_id: String,
    /// Catalog search string (empty for direct identifiers)
    pub query: String,
    pub threshold: f64,
    /// Resolved from an embedded identifier without a lookup
    pub direct: bool,
    pub best: Option<MatchResult>,
    pub reference: Option<CatalogReference>,
    /// Why no reference could be built, if a match was found
    pub reference_error: Option<String>,
    pub ranked: Vec<MatchResult>,
    pub candidates_considered: usize,
}

/// POST /match
pub async fn match_record(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> ApiResult<Json<MatchResponse>> {
    if !(0.0..=1.0).contains(&request.threshold) {
        return Err(ApiError::BadRequest(format!(
            "threshold must be within [0, 1], got {}",
            request.threshold
        )));
    }

    let record = match (request.record, request.record_id) {
        (Some(record), _) => record,
        (None, Some(id)) => crate::db::records::load_record(&state.db, &id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Record not found: {}", id)))?,
        (None, None) => {
            return Err(ApiError::BadRequest("Either record or record_id is required".to_string()));
        }
    };

    if let Some(direct) = state.resolver.direct_identifier(&record) {
        let (reference, reference_error) = split_reference(state.resolver.resolve_direct(&record, &direct));
        debug!(record_id = %record.id, "Manual match answered from embedded identifier");
        return Ok(Json(MatchResponse {
            record_id: record.id,
            query: String::new(),
            threshold: request.threshold,
            direct: true,
            best: None,
            reference,
            reference_error,
            ranked: Vec::new(),
            candidates_considered: 0,
        }));
    }

    let query = base_name_query(&record.name);
    if query.is_empty() {
        return Err(ApiError::BadRequest("Record name is empty".to_string()));
    }

    let limit = request.limit.unwrap_or(state.run_defaults.candidate_limit).max(1);
    let candidates = state
        .catalog
        .search_by_name(&query, limit, &QuotaBudget::unlimited())
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let selection = MatchSelector::default().select(&record, &candidates, request.threshold);

    let (reference, reference_error) = match &selection.best {
        Some(best) => split_reference(state.resolver.resolve(&record, Some(best))),
        None => (None, None),
    };

    info!(
        record_id = %record.id,
        query = %query,
        candidates = candidates.len(),
        matched = selection.is_match(),
        "Manual match"
    );

    let mut ranked = selection.ranked;
    ranked.truncate(MAX_RANKED);

    Ok(Json(MatchResponse {
        record_id: record.id,
        query,
        threshold: request.threshold,
        direct: false,
        best: selection.best,
        reference,
        reference_error,
        ranked,
        candidates_considered: candidates.len(),
    }))
}

fn split_reference(
    result: Result<CatalogReference, ReconcileError>,
) -> (Option<CatalogReference>, Option<String>) {
    match result {
        Ok(reference) => (Some(reference), None),
        Err(e) => (None, Some(e.to_string())),
    }
}

/// Build matching routes
pub fn matching_routes() -> Router<AppState> {
    Router::new().route("/match", post(match_record))
}
