//! CardMarket singles mirror
//!
//! Filled from the CardMarket product catalog export
//! (`products_singles_*.json`) and queried by name prefix.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use vault_common::{Error, Result};

/// Rows written per transaction during import
pub const IMPORT_BATCH_SIZE: usize = 1000;

/// Placeholder the export uses for an unknown date
const NULL_DATE: &str = "0000-00-00 00:00:00";

/// One row of `cardmarket_singles`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleRow {
    pub id_product: u64,
    pub name: String,
    pub id_expansion: Option<i64>,
}

/// Catalog export file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCatalogFile {
    #[serde(default)]
    pub version: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
}

/// One product of the catalog export
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id_product: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id_category: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub id_expansion: Option<i64>,
    #[serde(default)]
    pub id_metacard: Option<i64>,
    #[serde(default)]
    pub date_added: Option<String>,
}

/// Escape LIKE wildcards so a card name is matched literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Rows whose name starts with `prefix` (ASCII case-insensitive)
pub async fn search_singles(pool: &SqlitePool, prefix: &str, limit: usize) -> Result<Vec<SingleRow>> {
    let pattern = format!("{}%", escape_like(prefix));

    let rows = sqlx::query(
        r#"
        SELECT id_product, name, id_expansion
        FROM cardmarket_singles
        WHERE name LIKE ? ESCAPE '\'
        ORDER BY id_product
        LIMIT ?
        "#,
    )
    .bind(pattern)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SingleRow {
            id_product: row.get::<i64, _>("id_product") as u64,
            name: row.get("name"),
            id_expansion: row.get("id_expansion"),
        })
        .collect())
}

/// Upsert catalog products in batches
///
/// Products without a name are skipped. Returns the number written.
pub async fn import_singles(pool: &SqlitePool, products: &[CatalogProduct]) -> Result<usize> {
    let mut imported = 0;

    for (index, batch) in products.chunks(IMPORT_BATCH_SIZE).enumerate() {
        let mut tx = pool.begin().await?;

        for product in batch.iter().filter(|p| !p.name.trim().is_empty()) {
            let date_added = product.date_added.as_deref().filter(|d| *d != NULL_DATE);

            sqlx::query(
                r#"
                INSERT INTO cardmarket_singles
                    (id_product, name, id_category, category_name, id_expansion, id_metacard, date_added)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id_product) DO UPDATE SET
                    name = excluded.name,
                    id_category = excluded.id_category,
                    category_name = excluded.category_name,
                    id_expansion = excluded.id_expansion,
                    id_metacard = excluded.id_metacard,
                    date_added = excluded.date_added
                "#,
            )
            .bind(product.id_product as i64)
            .bind(&product.name)
            .bind(product.id_category)
            .bind(&product.category_name)
            .bind(product.id_expansion)
            .bind(product.id_metacard)
            .bind(date_added)
            .execute(&mut *tx)
            .await?;

            imported += 1;
        }

        tx.commit().await?;
        tracing::debug!(batch = index + 1, imported, total = products.len(), "Imported catalog batch");
    }

    Ok(imported)
}

/// Read and import a catalog export file
pub async fn import_catalog_file(pool: &SqlitePool, path: &std::path::Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path).await?;
    let file: ProductCatalogFile = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Parse {} failed: {}", path.display(), e)))?;

    tracing::info!(
        path = %path.display(),
        products = file.products.len(),
        created_at = file.created_at.as_deref().unwrap_or("unknown"),
        "Importing CardMarket catalog"
    );

    import_singles(pool, &file.products).await
}
