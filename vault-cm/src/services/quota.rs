//! Per-run request budget
//!
//! Lookups are reserved before a sub-batch starts so a run never exceeds
//! its budget. Catalog clients that send more than one HTTP request for a
//! lookup draw the extra requests from the same budget while the sub-batch
//! runs concurrently. A warning is raised once when usage crosses 90%.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Usage ratio at which a warning is raised
pub const WARNING_RATIO: f64 = 0.9;

/// Request budget, shared by reference between concurrent lookups
#[derive(Debug)]
pub struct QuotaBudget {
    limit: u64,
    used: AtomicU64,
    warned: AtomicBool,
}

impl QuotaBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
            warned: AtomicBool::new(false),
        }
    }

    /// Budget for callers outside a run, such as manual matching
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Reserve up to `wanted` requests; returns how many were granted
    pub fn reserve(&self, wanted: u64) -> u64 {
        let mut granted = 0;
        // fetch_update retries the closure until no other lookup raced it
        let _ = self.used.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
            granted = wanted.min(self.limit.saturating_sub(used));
            (granted > 0).then_some(used + granted)
        });
        granted
    }

    /// Draw a single request, false when nothing is left
    pub fn try_draw(&self) -> bool {
        self.reserve(1) == 1
    }

    /// True exactly once, the first time usage reaches the warning ratio
    pub fn take_warning(&self) -> bool {
        if self.limit == 0 || self.warned.load(Ordering::SeqCst) {
            return false;
        }
        if self.used() as f64 >= self.limit as f64 * WARNING_RATIO {
            return !self.warned.swap(true, Ordering::SeqCst);
        }
        false
    }
}
