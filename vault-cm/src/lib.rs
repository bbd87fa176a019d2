//! vault-cm library interface
//!
//! CardMarket identity resolution and bulk reconciliation for VaultEstim
//! card records. Exposes public APIs for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use vault_common::events::EventBus;

use crate::models::RunParameters;
use crate::services::{CandidateStore, IdentifierResolver};

/// Run currently executing in the background
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_key: String,
    pub cancel: CancellationToken,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Active runs by run id
    pub active_runs: Arc<RwLock<HashMap<Uuid, ActiveRun>>>,
    /// Catalog used for candidate lookups
    pub catalog: Arc<dyn CandidateStore>,
    pub resolver: IdentifierResolver,
    /// Parameters applied when a start request leaves fields out
    pub run_defaults: RunParameters,
    /// TOML file the API key is mirrored to
    pub config_path: Option<PathBuf>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Cancelled when the server shuts down; ends open SSE streams
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, catalog: Arc<dyn CandidateStore>) -> Self {
        Self {
            db,
            event_bus,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            resolver: IdentifierResolver::default(),
            run_defaults: RunParameters::default(),
            config_path: None,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: IdentifierResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_run_defaults(mut self, run_defaults: RunParameters) -> Self {
        self.run_defaults = run_defaults;
        self
    }

    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    /// Remember an error for the health endpoint
    pub async fn set_last_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::reconcile_routes())
        .route("/reconcile/events", get(api::reconcile_event_stream))
        .merge(api::matching_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        // The collection UI is served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
