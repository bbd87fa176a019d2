//! Test Helper Utilities
//!
//! In-memory stores and a scripted catalog for driving the batch runner
//! without SQLite or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use vault_cm::models::{CandidateListing, ProgressState, RunParameters, SourceRecord};
use vault_cm::services::{
    BatchRunner, CandidateStore, CatalogError, CatalogReference, IdentifierResolver, ProgressStore, QuotaBudget,
    RecordStore,
};
use vault_common::events::EventBus;

/// Record store backed by a vector, ordered by id like the SQLite store
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<SourceRecord>>,
    writes: Mutex<Vec<(String, CatalogReference)>>,
    fail_writes_for: HashSet<String>,
}

impl MemoryRecordStore {
    pub fn new(mut records: Vec<SourceRecord>) -> Self {
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make write-back fail for these ids
    pub fn failing_writes<I: IntoIterator<Item = &'static str>>(mut self, ids: I) -> Self {
        self.fail_writes_for = ids.into_iter().map(str::to_string).collect();
        self
    }

    pub fn writes(&self) -> Vec<(String, CatalogReference)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn record(&self, id: &str) -> Option<SourceRecord> {
        self.records.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_page(&self, offset: usize, limit: usize) -> vault_common::Result<Vec<SourceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn write_reference(&self, record_id: &str, reference: &CatalogReference) -> vault_common::Result<()> {
        if self.fail_writes_for.contains(record_id) {
            return Err(vault_common::Error::Internal("database is read-only".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| vault_common::Error::NotFound(record_id.to_string()))?;
        record.catalog_url = Some(reference.url.clone());
        record.catalog_id = Some(reference.catalog_id);

        self.writes
            .lock()
            .unwrap()
            .push((record_id.to_string(), reference.clone()));
        Ok(())
    }
}

/// Catalog answering name-prefix lookups from a fixed listing set
#[derive(Default)]
pub struct FakeCatalog {
    listings: Vec<CandidateListing>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    fail_queries: HashSet<String>,
    /// Cancelled once `cancel_after` lookups have been answered
    cancel: Option<(CancellationToken, usize)>,
}

impl FakeCatalog {
    pub fn new(listings: Vec<CandidateListing>) -> Self {
        Self {
            listings,
            ..Self::default()
        }
    }

    /// Lookups for these queries fail with a network error
    pub fn failing<I: IntoIterator<Item = &'static str>>(mut self, queries: I) -> Self {
        self.fail_queries = queries.into_iter().map(str::to_string).collect();
        self
    }

    pub fn cancelling_after(mut self, token: CancellationToken, calls: usize) -> Self {
        self.cancel = Some((token, calls));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateStore for FakeCatalog {
    async fn search_by_name(
        &self,
        query: &str,
        limit: usize,
        _quota: &QuotaBudget,
    ) -> Result<Vec<CandidateListing>, CatalogError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().unwrap().push(query.to_string());

        if let Some((token, after)) = &self.cancel {
            if calls >= *after {
                token.cancel();
            }
        }

        if self.fail_queries.contains(query) {
            return Err(CatalogError::Network("connection reset".to_string()));
        }

        let prefix = query.to_lowercase();
        Ok(self
            .listings
            .iter()
            .filter(|l| l.card_name.to_lowercase().starts_with(&prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

/// Progress store keeping saved states in a map
#[derive(Default)]
pub struct MemoryProgressStore {
    saved: Mutex<HashMap<String, ProgressState>>,
    saves: AtomicUsize,
    /// Number of upcoming saves that fail
    failures_left: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn with_state(run_key: &str, state: ProgressState) -> Self {
        let store = Self::default();
        store.saved.lock().unwrap().insert(run_key.to_string(), state);
        store
    }

    pub fn failing_saves(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn saved(&self, run_key: &str) -> Option<ProgressState> {
        self.saved.lock().unwrap().get(run_key).cloned()
    }

    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, run_key: &str) -> vault_common::Result<ProgressState> {
        Ok(self.saved(run_key).unwrap_or_default())
    }

    async fn save(&self, run_key: &str, state: &ProgressState) -> vault_common::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(vault_common::Error::Internal("disk full".to_string()));
        }

        self.saved.lock().unwrap().insert(run_key.to_string(), state.clone());
        Ok(())
    }
}

/// Parameters with no inter-batch delay and checkpoints after every sub-batch
pub fn fast_params() -> RunParameters {
    RunParameters {
        batch_delay_ms: 0,
        checkpoint_every: 1,
        ..RunParameters::default()
    }
}

pub fn runner(
    records: Arc<MemoryRecordStore>,
    catalog: Arc<FakeCatalog>,
    progress: Arc<MemoryProgressStore>,
) -> (BatchRunner, EventBus) {
    let event_bus = EventBus::new(1000);
    let runner = BatchRunner::new(records, catalog, progress, IdentifierResolver::default(), event_bus.clone());
    (runner, event_bus)
}

/// `count` records in Paldea Evolved named `Card 000`, `Card 001`, ...
/// each matching exactly one catalog listing
pub fn numbered_fixture(count: usize) -> (Vec<SourceRecord>, Vec<CandidateListing>) {
    let records = (0..count)
        .map(|i| {
            SourceRecord::new(format!("sv2-{:03}", i), format!("Card {:03}", i))
                .with_attacks([format!("Strike {:03}", i)])
        })
        .collect();
    let listings = (0..count)
        .map(|i| CandidateListing::new(1000 + i as u64, format!("Card {:03} [Strike {:03}]", i, i), "sv2"))
        .collect();
    (records, listings)
}

/// The Amoonguss scenario: one exact listing and one other variant
pub fn amoonguss_listings() -> Vec<CandidateListing> {
    vec![
        CandidateListing::new(101, "Amoonguss [Sporprise | Rising Lunge]", "Paldea Evolved"),
        CandidateListing::new(202, "Amoonguss [Foul Play] ex", "Paldea Evolved"),
    ]
}
