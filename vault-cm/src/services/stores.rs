//! Record and progress store seams
//!
//! The batch runner only talks to these traits; the SQLite implementations
//! below back the service, tests substitute in-memory ones.

use async_trait::async_trait;
use sqlx::SqlitePool;
use vault_common::Result;

use super::resolver::CatalogReference;
use crate::db;
use crate::models::{ProgressState, SourceRecord};

/// Paged read and write-back over local card records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records `[offset, offset + limit)` in a stable order
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<SourceRecord>>;

    /// Store a resolved reference on a record (idempotent upsert by id)
    async fn write_reference(&self, record_id: &str, reference: &CatalogReference) -> Result<()>;
}

/// Persisted, resumable progress keyed by run key
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, run_key: &str) -> Result<ProgressState>;

    async fn save(&self, run_key: &str, state: &ProgressState) -> Result<()>;
}

/// `discovered_cards` table
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<SourceRecord>> {
        db::records::fetch_page(&self.pool, offset, limit).await
    }

    async fn write_reference(&self, record_id: &str, reference: &CatalogReference) -> Result<()> {
        db::records::write_reference(&self.pool, record_id, reference.catalog_id, &reference.url).await
    }
}

/// `reconcile_progress` table
#[derive(Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn load(&self, run_key: &str) -> Result<ProgressState> {
        db::progress::load_progress(&self.pool, run_key).await
    }

    async fn save(&self, run_key: &str, state: &ProgressState) -> Result<()> {
        db::progress::save_progress(&self.pool, run_key, state).await
    }
}
