//! Settings API endpoint
//!
//! Provides POST /api/settings/catalog_api_key for operator configuration

use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Request payload for setting the catalog API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

/// Response payload for API key configuration
#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    /// Human-readable status message
    pub message: String,
}

/// POST /api/settings/catalog_api_key handler
///
/// **Request:** `{"api_key": "your-rapidapi-key"}`
/// **Response:** `{"success": true, "message": "..."}`
///
/// The database copy is authoritative; the TOML file is a best-effort
/// backup. The key takes effect for the hosted catalog on next start.
///
/// **Errors:**
/// - 400 Bad Request: Empty or whitespace-only key
/// - 500 Internal Server Error: Database write failure
pub async fn set_catalog_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    let api_key = payload.api_key.trim().to_string();

    crate::db::settings::set_catalog_api_key(&state.db, api_key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("Catalog API key configured via API");

    if let Some(toml_path) = &state.config_path {
        if let Err(e) = crate::config::sync_api_key_to_toml(&api_key, toml_path) {
            warn!("TOML sync failed (database write succeeded): {}", e);
        }
    }

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "Catalog API key configured successfully".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/catalog_api_key", post(set_catalog_api_key))
}
