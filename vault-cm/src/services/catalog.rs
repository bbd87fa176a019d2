//! Candidate stores
//!
//! Read-only access to the external catalog. Every implementation returns
//! normalized [`CandidateListing`]s, so scoring never sees raw rows.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

use super::quota::QuotaBudget;
use crate::db;
use crate::models::CandidateListing;

/// Catalog lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Catalog database error: {0}")]
    Database(String),

    #[error("Catalog API key not configured")]
    NotConfigured,
}

/// Name-prefix lookup over the external catalog
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Up to `limit` listings whose name starts with `query`
    ///
    /// The caller has already charged `quota` one request for the lookup.
    /// Any further request (a retry) draws from `quota` first and the
    /// lookup fails when nothing is left.
    async fn search_by_name(
        &self,
        query: &str,
        limit: usize,
        quota: &QuotaBudget,
    ) -> Result<Vec<CandidateListing>, CatalogError>;

    /// Short name for logs
    fn source_name(&self) -> &'static str;
}

/// Candidate store over the local `cardmarket_singles` mirror
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateStore for SqliteCatalog {
    async fn search_by_name(
        &self,
        query: &str,
        limit: usize,
        _quota: &QuotaBudget,
    ) -> Result<Vec<CandidateListing>, CatalogError> {
        let rows = db::catalog::search_singles(&self.pool, query, limit)
            .await
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let expansion = row.id_expansion.map(|e| e.to_string()).unwrap_or_default();
                CandidateListing::new(row.id_product, row.name, expansion)
            })
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "cardmarket_singles"
    }
}
