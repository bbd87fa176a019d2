//! Batch Runner
//!
//! Drives a reconciliation run over the whole record set:
//!
//! IDLE → PAGING → FILTERING → PROCESSING → CHECKPOINTING →
//! (PROCESSING | DONE | CANCELLED | QUOTA_EXHAUSTED | ABORTED)
//!
//! Records are read page by page, filtered against the persisted progress,
//! and resolved in small concurrent sub-batches separated by a fixed delay.
//! Cancellation and the request budget are checked before every sub-batch,
//! so a cancel takes effect within one sub-batch. Progress is reported on the
//! event bus; the final tallies come back as a [`RunReport`].

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vault_common::events::{EventBus, VaultEvent};

use super::catalog::CandidateStore;
use super::quota::QuotaBudget;
use super::resolver::{CatalogReference, IdentifierResolver};
use super::scoring::base_name_query;
use super::selector::MatchSelector;
use super::stores::{ProgressStore, RecordStore};
use crate::error::ReconcileError;
use crate::models::{ProgressState, ReferenceSource, RunParameters, RunReport, RunState, SourceRecord};

/// Run stopped in the ABORTED state
///
/// Carries the report as it stood when the run stopped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunAborted {
    pub error: ReconcileError,
    pub report: Box<RunReport>,
}

/// Mutable state of one run
struct RunContext<'a> {
    run_id: Uuid,
    params: &'a RunParameters,
    state: RunState,
    report: RunReport,
    progress: ProgressState,
    quota: QuotaBudget,
    batches_since_checkpoint: usize,
    consecutive_checkpoint_failures: u32,
}

/// Batch runner
pub struct BatchRunner {
    records: Arc<dyn RecordStore>,
    catalog: Arc<dyn CandidateStore>,
    progress: Arc<dyn ProgressStore>,
    selector: MatchSelector,
    resolver: IdentifierResolver,
    event_bus: EventBus,
}

impl BatchRunner {
    pub fn new(
        records: Arc<dyn RecordStore>,
        catalog: Arc<dyn CandidateStore>,
        progress: Arc<dyn ProgressStore>,
        resolver: IdentifierResolver,
        event_bus: EventBus,
    ) -> Self {
        Self {
            records,
            catalog,
            progress,
            selector: MatchSelector::default(),
            resolver,
            event_bus,
        }
    }

    /// Execute a complete run
    ///
    /// Returns the report for DONE, CANCELLED and QUOTA_EXHAUSTED. An ABORTED
    /// run flushes progress best-effort and returns [`RunAborted`].
    pub async fn run(
        &self,
        run_id: Uuid,
        params: &RunParameters,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunAborted> {
        let start_time = Instant::now();

        info!(
            run_id = %run_id,
            run_key = %params.run_key,
            batch_size = params.effective_batch_size(),
            max_requests = params.max_requests,
            catalog = self.catalog.source_name(),
            "Starting reconciliation run"
        );

        self.event_bus.emit_lossy(VaultEvent::ReconcileStarted {
            run_id,
            run_key: params.run_key.clone(),
            timestamp: Utc::now(),
        });

        let progress = match self.progress.load(&params.run_key).await {
            Ok(progress) => progress,
            Err(e) => {
                let report = RunReport::new(run_id, &params.run_key);
                let error = ReconcileError::Aborted(format!("Failed to load progress: {}", e));
                return Err(self.abort_without_flush(report, error, start_time));
            }
        };

        info!(
            run_id = %run_id,
            already_processed = progress.processed_count(),
            "Loaded reconciliation progress"
        );

        let mut ctx = RunContext {
            run_id,
            params,
            state: RunState::Idle,
            report: RunReport::new(run_id, &params.run_key),
            progress,
            quota: QuotaBudget::new(params.max_requests),
            batches_since_checkpoint: 0,
            consecutive_checkpoint_failures: 0,
        };

        let outcome = self.drive(&mut ctx, &cancel).await;
        self.finish(ctx, outcome, start_time).await
    }

    /// Page, filter and process until a terminal state is reached
    async fn drive(&self, ctx: &mut RunContext<'_>, cancel: &CancellationToken) -> Result<RunState, ReconcileError> {
        let page_size = ctx.params.page_size.max(1);
        let batch_size = ctx.params.effective_batch_size();
        let delay = Duration::from_millis(ctx.params.batch_delay_ms);
        let mut offset = 0usize;
        let mut first_batch = true;

        loop {
            if cancel.is_cancelled() {
                return Ok(RunState::Cancelled);
            }

            self.transition(ctx, RunState::Paging);
            let page = self
                .records
                .fetch_page(offset, page_size)
                .await
                .map_err(|e| ReconcileError::Aborted(format!("Failed to read records at offset {}: {}", offset, e)))?;

            let page_len = page.len();
            offset += page_len;
            ctx.report.records_scanned += page_len;

            self.transition(ctx, RunState::Filtering);
            let pending = self.filter_pending(ctx, page);
            ctx.report.pending += pending.len();

            debug!(
                run_id = %ctx.run_id,
                offset,
                page_len,
                pending = pending.len(),
                "Fetched record page"
            );

            for chunk in pending.chunks(batch_size) {
                if cancel.is_cancelled() {
                    return Ok(RunState::Cancelled);
                }

                if !first_batch && !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(RunState::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                first_batch = false;

                let (take, lookups) = self.plan_sub_batch(chunk, ctx.quota.remaining());
                if take == 0 {
                    info!(
                        run_id = %ctx.run_id,
                        used = ctx.quota.used(),
                        limit = ctx.quota.limit(),
                        "Request budget exhausted"
                    );
                    return Ok(RunState::QuotaExhausted);
                }

                ctx.quota.reserve(lookups);
                self.warn_on_quota(ctx);

                self.transition(ctx, RunState::Processing);
                self.process_sub_batch(ctx, &chunk[..take]).await;
                // Retries inside the sub-batch may have drawn more
                self.warn_on_quota(ctx);

                ctx.batches_since_checkpoint += 1;
                if ctx.batches_since_checkpoint >= ctx.params.checkpoint_every.max(1) {
                    self.checkpoint(ctx).await?;
                }

                if take < chunk.len() {
                    info!(
                        run_id = %ctx.run_id,
                        deferred = chunk.len() - take,
                        "Request budget exhausted mid sub-batch"
                    );
                    return Ok(RunState::QuotaExhausted);
                }
            }

            if page_len < page_size {
                return Ok(RunState::Done);
            }
        }
    }

    fn warn_on_quota(&self, ctx: &RunContext<'_>) {
        if !ctx.quota.take_warning() {
            return;
        }
        warn!(
            run_id = %ctx.run_id,
            used = ctx.quota.used(),
            limit = ctx.quota.limit(),
            "Request budget above 90%"
        );
        self.event_bus.emit_lossy(VaultEvent::QuotaWarning {
            run_id: ctx.run_id,
            used: ctx.quota.used(),
            limit: ctx.quota.limit(),
            timestamp: Utc::now(),
        });
    }

    /// Drop already-processed and already-resolved records
    fn filter_pending(&self, ctx: &mut RunContext<'_>, page: Vec<SourceRecord>) -> Vec<SourceRecord> {
        page.into_iter()
            .filter(|record| {
                if ctx.progress.is_processed(&record.id) {
                    ctx.report.already_processed += 1;
                    false
                } else if self.resolver.is_resolved(record) {
                    ctx.report.already_resolved += 1;
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    /// Whether resolving this record costs a catalog request
    fn needs_lookup(&self, record: &SourceRecord) -> bool {
        self.resolver.direct_identifier(record).is_none()
            && !record.name.trim().is_empty()
            && record
                .expansion_code()
                .is_some_and(|code| self.resolver.slugs().slug(&code).is_some())
    }

    /// Longest prefix of `chunk` whose lookups fit in `remaining`
    ///
    /// Returns (records to process, lookups they need).
    fn plan_sub_batch(&self, chunk: &[SourceRecord], remaining: u64) -> (usize, u64) {
        let mut lookups = 0u64;
        let mut take = 0usize;

        for record in chunk {
            let cost = u64::from(self.needs_lookup(record));
            if lookups + cost > remaining {
                break;
            }
            lookups += cost;
            take += 1;
        }

        (take, lookups)
    }

    async fn process_sub_batch(&self, ctx: &mut RunContext<'_>, batch: &[SourceRecord]) {
        let params = ctx.params;
        let quota = &ctx.quota;
        let outcomes = join_all(batch.iter().map(|record| self.process_record(record, params, quota))).await;

        for (record, outcome) in batch.iter().zip(outcomes) {
            self.record_outcome(ctx, record, outcome);
        }

        if let Some(last) = batch.last() {
            ctx.progress.cursor = Some(last.id.clone());
        }
        ctx.progress.touch();
        ctx.report.external_requests = ctx.quota.used();
        ctx.report.processed_total = ctx.progress.processed_count();

        self.event_bus.emit_lossy(VaultEvent::ReconcileProgress {
            run_id: ctx.run_id,
            totals: ctx.report.totals(),
            timestamp: Utc::now(),
        });
    }

    /// Resolve one record and write the reference back
    async fn process_record(
        &self,
        record: &SourceRecord,
        params: &RunParameters,
        quota: &QuotaBudget,
    ) -> Result<CatalogReference, ReconcileError> {
        let reference = match self.resolver.direct_identifier(record) {
            Some(direct) => self.resolver.resolve_direct(record, &direct)?,
            None => self.match_record(record, params, quota).await?,
        };

        self.records
            .write_reference(&record.id, &reference)
            .await
            .map_err(|e| ReconcileError::Persistence(e.to_string()))?;

        Ok(reference)
    }

    /// Catalog lookup, scoring and selection for a record without an identifier
    async fn match_record(
        &self,
        record: &SourceRecord,
        params: &RunParameters,
        quota: &QuotaBudget,
    ) -> Result<CatalogReference, ReconcileError> {
        // Checked before the lookup so an unmappable record costs no request
        let code = record.expansion_code();
        if code.as_deref().and_then(|c| self.resolver.slugs().slug(c)).is_none() {
            return Err(ReconcileError::UnmappedExpansion { code });
        }

        let query = base_name_query(&record.name);
        if query.is_empty() {
            return Err(ReconcileError::NotFound { query });
        }

        let candidates = self
            .catalog
            .search_by_name(&query, params.candidate_limit, quota)
            .await
            .map_err(|e| ReconcileError::TransientNetwork(e.to_string()))?;

        if candidates.is_empty() {
            return Err(ReconcileError::NotFound { query });
        }

        let selection = self.selector.select(record, &candidates, params.accept_threshold);
        match selection.best {
            Some(best) => self.resolver.resolve(record, Some(&best)),
            None => Err(ReconcileError::NoMatch {
                best_score: selection.top().map(|m| m.score).unwrap_or(0.0),
            }),
        }
    }

    fn record_outcome(
        &self,
        ctx: &mut RunContext<'_>,
        record: &SourceRecord,
        outcome: Result<CatalogReference, ReconcileError>,
    ) {
        match outcome {
            Ok(reference) => {
                debug!(
                    run_id = %ctx.run_id,
                    record_id = %record.id,
                    catalog_id = reference.catalog_id,
                    "Record resolved"
                );
                ctx.report.succeeded += 1;
                ctx.progress.succeeded += 1;
                if reference.source == ReferenceSource::Direct {
                    ctx.report.direct_resolved += 1;
                }
                ctx.progress.mark_processed(&record.id);

                self.event_bus.emit_lossy(VaultEvent::RecordResolved {
                    run_id: ctx.run_id,
                    record_id: record.id.clone(),
                    catalog_id: reference.catalog_id,
                    url: reference.url,
                    source: reference.source,
                    score: reference.score,
                    timestamp: Utc::now(),
                });
            }
            Err(error) => {
                match &error {
                    ReconcileError::NotFound { .. } => ctx.report.breakdown.not_found += 1,
                    ReconcileError::NoMatch { .. } => ctx.report.breakdown.no_match += 1,
                    ReconcileError::UnmappedExpansion { .. } => ctx.report.breakdown.unmapped_expansion += 1,
                    ReconcileError::TransientNetwork(_) => ctx.report.breakdown.transient += 1,
                    ReconcileError::Persistence(_) => ctx.report.breakdown.persistence += 1,
                    ReconcileError::Aborted(_) => {}
                }

                let marked_processed = error.marks_processed();
                if marked_processed {
                    ctx.progress.mark_processed(&record.id);
                }

                if error.is_skip() {
                    debug!(run_id = %ctx.run_id, record_id = %record.id, reason = %error, "Record skipped");
                    ctx.report.skipped += 1;
                    ctx.progress.skipped += 1;
                    self.event_bus.emit_lossy(VaultEvent::RecordSkipped {
                        run_id: ctx.run_id,
                        record_id: record.id.clone(),
                        reason: error.to_string(),
                        timestamp: Utc::now(),
                    });
                } else {
                    warn!(run_id = %ctx.run_id, record_id = %record.id, error = %error, "Record failed");
                    ctx.report.errored += 1;
                    ctx.progress.errored += 1;
                    ctx.report.push_error(&record.id, error.code(), error.to_string());
                    self.event_bus.emit_lossy(VaultEvent::RecordFailed {
                        run_id: ctx.run_id,
                        record_id: record.id.clone(),
                        error: error.to_string(),
                        marked_processed,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
    }

    /// Persist progress; too many consecutive failures abort the run
    async fn checkpoint(&self, ctx: &mut RunContext<'_>) -> Result<(), ReconcileError> {
        self.transition(ctx, RunState::Checkpointing);

        match self.progress.save(&ctx.params.run_key, &ctx.progress).await {
            Ok(()) => {
                ctx.batches_since_checkpoint = 0;
                ctx.consecutive_checkpoint_failures = 0;
                debug!(run_id = %ctx.run_id, processed = ctx.progress.processed_count(), "Checkpoint saved");
                self.event_bus.emit_lossy(VaultEvent::CheckpointSaved {
                    run_id: ctx.run_id,
                    processed_ids: ctx.progress.processed_count(),
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                ctx.consecutive_checkpoint_failures += 1;
                ctx.report.breakdown.persistence += 1;
                warn!(
                    run_id = %ctx.run_id,
                    error = %e,
                    consecutive_failures = ctx.consecutive_checkpoint_failures,
                    "Checkpoint failed, continuing with in-memory progress"
                );
                self.event_bus.emit_lossy(VaultEvent::CheckpointFailed {
                    run_id: ctx.run_id,
                    error: e.to_string(),
                    consecutive_failures: ctx.consecutive_checkpoint_failures,
                    timestamp: Utc::now(),
                });

                if ctx.consecutive_checkpoint_failures >= ctx.params.max_checkpoint_failures.max(1) {
                    return Err(ReconcileError::Aborted(format!(
                        "{} consecutive checkpoint failures, last: {}",
                        ctx.consecutive_checkpoint_failures, e
                    )));
                }
                Ok(())
            }
        }
    }

    /// Flush progress and build the final report
    async fn finish(
        &self,
        mut ctx: RunContext<'_>,
        outcome: Result<RunState, ReconcileError>,
        start_time: Instant,
    ) -> Result<RunReport, RunAborted> {
        let (final_state, abort_error) = match outcome {
            Ok(state) => (state, None),
            Err(error) => (RunState::Aborted, Some(error)),
        };

        if final_state != RunState::Aborted {
            self.transition(&mut ctx, RunState::Checkpointing);
        }

        ctx.progress.touch();
        if let Err(e) = self.progress.save(&ctx.params.run_key, &ctx.progress).await {
            ctx.report.breakdown.persistence += 1;
            warn!(run_id = %ctx.run_id, error = %e, "Final progress flush failed");
        }

        self.transition(&mut ctx, final_state);

        let mut report = ctx.report;
        report.final_state = final_state;
        report.external_requests = ctx.quota.used();
        report.processed_total = ctx.progress.processed_count();
        report.duration_ms = start_time.elapsed().as_millis() as u64;

        match abort_error {
            None => {
                info!(
                    run_id = %ctx.run_id,
                    final_state = final_state.as_str(),
                    succeeded = report.succeeded,
                    skipped = report.skipped,
                    errored = report.errored,
                    external_requests = report.external_requests,
                    duration_ms = report.duration_ms,
                    "Reconciliation run finished"
                );
                self.event_bus.emit_lossy(VaultEvent::ReconcileFinished {
                    run_id: ctx.run_id,
                    final_state,
                    totals: report.totals(),
                    duration_seconds: start_time.elapsed().as_secs(),
                    timestamp: Utc::now(),
                });
                Ok(report)
            }
            Some(error) => {
                report.abort_reason = Some(error.to_string());
                tracing::error!(run_id = %ctx.run_id, error = %error, "Reconciliation run aborted");
                self.event_bus.emit_lossy(VaultEvent::ReconcileFailed {
                    run_id: ctx.run_id,
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
                Err(RunAborted {
                    error,
                    report: Box::new(report),
                })
            }
        }
    }

    /// Abort before any progress exists to flush
    fn abort_without_flush(&self, mut report: RunReport, error: ReconcileError, start_time: Instant) -> RunAborted {
        report.final_state = RunState::Aborted;
        report.abort_reason = Some(error.to_string());
        report.duration_ms = start_time.elapsed().as_millis() as u64;

        tracing::error!(run_id = %report.run_id, error = %error, "Reconciliation run aborted");
        self.event_bus.emit_lossy(VaultEvent::ReconcileStateChanged {
            run_id: report.run_id,
            old_state: RunState::Idle,
            new_state: RunState::Aborted,
            timestamp: Utc::now(),
        });
        self.event_bus.emit_lossy(VaultEvent::ReconcileFailed {
            run_id: report.run_id,
            error: error.to_string(),
            timestamp: Utc::now(),
        });

        RunAborted {
            error,
            report: Box::new(report),
        }
    }

    fn transition(&self, ctx: &mut RunContext<'_>, new_state: RunState) {
        if ctx.state == new_state {
            return;
        }
        let old_state = ctx.state;
        ctx.state = new_state;
        debug!(run_id = %ctx.run_id, from = old_state.as_str(), to = new_state.as_str(), "Run state changed");
        self.event_bus.emit_lossy(VaultEvent::ReconcileStateChanged {
            run_id: ctx.run_id,
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }
}
