//! Reconciliation run parameters
//!
//! Supplied per run by the caller (HTTP body), falling back to the TOML
//! `[reconcile]` section and then to the built-in defaults below.

use serde::{Deserialize, Serialize};
use vault_common::config::ReconcileDefaults;

/// Conservative threshold used for automatic acceptance
pub const ACCEPT_THRESHOLD: f64 = 0.5;

/// Permissive threshold used for exploratory / manual review
pub const REVIEW_THRESHOLD: f64 = 0.2;

/// Sub-batch size bounds applied unless `unclamped_batch_size` is set
pub const MIN_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 10;

/// Parameters of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Key of the persisted progress row (default: "default")
    #[serde(default = "default_run_key")]
    pub run_key: String,

    /// Records fetched per page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records resolved concurrently per sub-batch (default: 8, clamped 5-10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Skip the 5-10 clamp on `batch_size`
    #[serde(default)]
    pub unclamped_batch_size: bool,

    /// Pause between sub-batches in milliseconds (default: 300)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Persist progress every N sub-batches (default: 5)
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// External lookups allowed for this run (default: 400)
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Minimum score for automatic acceptance (default: 0.5)
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,

    /// Candidates requested per lookup (default: 50)
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Consecutive checkpoint failures tolerated before aborting (default: 3)
    #[serde(default = "default_max_checkpoint_failures")]
    pub max_checkpoint_failures: u32,
}

fn default_run_key() -> String {
    "default".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_delay_ms() -> u64 {
    300
}

fn default_checkpoint_every() -> usize {
    5
}

fn default_max_requests() -> u64 {
    400
}

fn default_accept_threshold() -> f64 {
    ACCEPT_THRESHOLD
}

fn default_candidate_limit() -> usize {
    50
}

fn default_max_checkpoint_failures() -> u32 {
    3
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            run_key: default_run_key(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            unclamped_batch_size: false,
            batch_delay_ms: default_batch_delay_ms(),
            checkpoint_every: default_checkpoint_every(),
            max_requests: default_max_requests(),
            accept_threshold: default_accept_threshold(),
            candidate_limit: default_candidate_limit(),
            max_checkpoint_failures: default_max_checkpoint_failures(),
        }
    }
}

impl RunParameters {
    /// Built-in defaults overlaid with the TOML `[reconcile]` section
    pub fn from_defaults(defaults: &ReconcileDefaults) -> Self {
        let mut params = Self::default();
        if let Some(v) = defaults.page_size {
            params.page_size = v;
        }
        if let Some(v) = defaults.batch_size {
            params.batch_size = v;
        }
        if let Some(v) = defaults.batch_delay_ms {
            params.batch_delay_ms = v;
        }
        if let Some(v) = defaults.checkpoint_every {
            params.checkpoint_every = v;
        }
        if let Some(v) = defaults.max_requests {
            params.max_requests = v;
        }
        if let Some(v) = defaults.accept_threshold {
            params.accept_threshold = v;
        }
        if let Some(v) = defaults.candidate_limit {
            params.candidate_limit = v;
        }
        params
    }

    /// Sub-batch size actually used by the runner
    pub fn effective_batch_size(&self) -> usize {
        if self.unclamped_batch_size {
            self.batch_size.max(1)
        } else {
            self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
        }
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.run_key.trim().is_empty() {
            return Err("run_key must not be empty".to_string());
        }
        if self.page_size == 0 {
            return Err("page_size must be at least 1".to_string());
        }
        if self.checkpoint_every == 0 {
            return Err("checkpoint_every must be at least 1".to_string());
        }
        if self.candidate_limit == 0 {
            return Err("candidate_limit must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            return Err(format!(
                "accept_threshold must be within [0, 1], got {}",
                self.accept_threshold
            ));
        }
        Ok(())
    }
}
