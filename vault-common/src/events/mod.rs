//! Event types for the VaultEstim event system
//!
//! Provides shared event definitions and the EventBus used by the services
//! to stream progress to subscribers (SSE handlers, tests, CLIs) instead of
//! invoking callbacks from inside long-running loops.

mod reconcile_types;

pub use reconcile_types::{ReferenceSource, RunState, RunTotals};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// VaultEstim event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultEvent {
    /// Reconciliation run started
    ReconcileStarted {
        run_id: Uuid,
        run_key: String,
        timestamp: DateTime<Utc>,
    },

    /// Run moved to a new state
    ReconcileStateChanged {
        run_id: Uuid,
        old_state: RunState,
        new_state: RunState,
        timestamp: DateTime<Utc>,
    },

    /// Emitted after every sub-batch
    ReconcileProgress {
        run_id: Uuid,
        totals: RunTotals,
        timestamp: DateTime<Utc>,
    },

    /// A record received a catalog reference
    RecordResolved {
        run_id: Uuid,
        record_id: String,
        catalog_id: u64,
        url: String,
        source: ReferenceSource,
        /// Match score; None for direct identifiers
        score: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A record was skipped (nothing found or nothing cleared the threshold)
    RecordSkipped {
        run_id: Uuid,
        record_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A record failed (counted as error)
    RecordFailed {
        run_id: Uuid,
        record_id: String,
        error: String,
        /// False when the record stays eligible for a future run
        marked_processed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Progress checkpoint persisted
    CheckpointSaved {
        run_id: Uuid,
        processed_ids: usize,
        timestamp: DateTime<Utc>,
    },

    /// Progress checkpoint could not be persisted
    CheckpointFailed {
        run_id: Uuid,
        error: String,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },

    /// Request budget crossed its warning threshold
    QuotaWarning {
        run_id: Uuid,
        used: u64,
        limit: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run reached a terminal state
    ReconcileFinished {
        run_id: Uuid,
        final_state: RunState,
        totals: RunTotals,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted with an error
    ReconcileFailed {
        run_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            VaultEvent::ReconcileStarted { .. } => "ReconcileStarted",
            VaultEvent::ReconcileStateChanged { .. } => "ReconcileStateChanged",
            VaultEvent::ReconcileProgress { .. } => "ReconcileProgress",
            VaultEvent::RecordResolved { .. } => "RecordResolved",
            VaultEvent::RecordSkipped { .. } => "RecordSkipped",
            VaultEvent::RecordFailed { .. } => "RecordFailed",
            VaultEvent::CheckpointSaved { .. } => "CheckpointSaved",
            VaultEvent::CheckpointFailed { .. } => "CheckpointFailed",
            VaultEvent::QuotaWarning { .. } => "QuotaWarning",
            VaultEvent::ReconcileFinished { .. } => "ReconcileFinished",
            VaultEvent::ReconcileFailed { .. } => "ReconcileFailed",
        }
    }

    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            VaultEvent::ReconcileStarted { run_id, .. }
            | VaultEvent::ReconcileStateChanged { run_id, .. }
            | VaultEvent::ReconcileProgress { run_id, .. }
            | VaultEvent::RecordResolved { run_id, .. }
            | VaultEvent::RecordSkipped { run_id, .. }
            | VaultEvent::RecordFailed { run_id, .. }
            | VaultEvent::CheckpointSaved { run_id, .. }
            | VaultEvent::CheckpointFailed { run_id, .. }
            | VaultEvent::QuotaWarning { run_id, .. }
            | VaultEvent::ReconcileFinished { run_id, .. }
            | VaultEvent::ReconcileFailed { run_id, .. } => *run_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use vault_common::events::{EventBus, VaultEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(VaultEvent::ReconcileStarted {
///     run_id: uuid::Uuid::new_v4(),
///     run_key: "default".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VaultEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: VaultEvent) -> Result<usize, broadcast::error::SendError<VaultEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: VaultEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
