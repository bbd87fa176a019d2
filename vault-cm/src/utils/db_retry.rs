//! Lock-contention retry for SQLite writes
//!
//! Record write-back, checkpoints and run history can collide with an import
//! or a second run on the same file. Those writes go through
//! [`retry_on_lock`], which backs off 10 ms, 20 ms, ... up to 1 s per step
//! until the configured wait budget is spent.

use sqlx::SqlitePool;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use vault_common::{Error, Result};

/// Used when `database_max_lock_wait_ms` is not set
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const FIRST_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Lock wait budget from the settings table
pub async fn lock_wait_ms(pool: &SqlitePool) -> u64 {
    const QUERY: &str = "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'database_max_lock_wait_ms'";

    sqlx::query_scalar::<_, i64>(QUERY)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .and_then(|ms| u64::try_from(ms).ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS)
}

/// Run `write`, retrying while SQLite reports the database as locked
///
/// Other errors are returned at once. Once `max_wait_ms` has passed the
/// lock error becomes `Error::Internal` naming `what`.
pub async fn retry_on_lock<F, Fut, T>(what: &str, max_wait_ms: u64, mut write: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut backoff = FIRST_BACKOFF_MS;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match write().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        write = what,
                        attempts,
                        waited_ms = started.elapsed().as_millis(),
                        "Write went through after lock wait"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= budget {
            warn!(write = what, attempts, error = %err, "Giving up on locked database");
            return Err(Error::Internal(format!(
                "Database locked during {}: {} attempts over {} ms",
                what,
                attempts,
                waited.as_millis()
            )));
        }

        debug!(write = what, attempts, backoff_ms = backoff, "Database locked, backing off");
        tokio::time::sleep(Duration::from_millis(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_MS);
    }
}
