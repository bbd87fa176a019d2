//! Utility modules for vault-cm

pub mod db_retry;

pub use db_retry::{lock_wait_ms, retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
