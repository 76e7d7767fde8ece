//! Progress events and their delivery
//!
//! The engine reports through a [`ProgressEmitter`]. Emission is
//! fire-and-forget: an emitter must never block the producing loop and never
//! retries. It is a notification channel for an observer (GUI, console), not
//! a durability mechanism.
//!
//! [`ProgressReporter`] owns the per-job counters and guarantees the event
//! invariants: `current` never decreases within a job, and `current <= total`
//! whenever `total >= 0` (`-1` means the upper bound is unknown).

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which side of the transfer an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Export,
    Import,
}

/// Work phase reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Exporting,
    Importing,
    Analyzing,
    Downloading,
    Writing,
    Finalizing,
}

/// One progress notification.
///
/// `current`/`total` count records for the whole job (all batch entries);
/// `processed_records`/`total_records` count records of the batch entry at
/// `batch_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    pub phase: TransferPhase,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub current: u64,
    pub total: i64,
    pub batch_index: usize,
    pub batch_total: usize,
    pub processed_records: u64,
    pub total_records: i64,
}

/// Everything an observer can receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TransferEvent {
    Progress {
        kind: TransferKind,
        #[serde(flatten)]
        progress: ProgressEvent,
    },
    Complete {
        kind: TransferKind,
        #[serde(rename = "jobId")]
        job_id: String,
        #[serde(rename = "outputPath")]
        output_path: PathBuf,
        records: u64,
        failed: u64,
    },
    Cancelled {
        kind: TransferKind,
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Warning {
        kind: TransferKind,
        #[serde(rename = "jobId")]
        job_id: String,
        message: String,
        skipped: Option<u64>,
    },
    Paused {
        #[serde(rename = "jobIds")]
        job_ids: Vec<String>,
    },
    Resumed {
        #[serde(rename = "jobIds")]
        job_ids: Vec<String>,
    },
}

impl TransferKind {
    fn prefix(&self) -> &'static str {
        match self {
            TransferKind::Export => "export",
            TransferKind::Import => "import",
        }
    }
}

impl TransferEvent {
    /// Event name, e.g. `export:progress` or `import:complete`.
    pub fn name(&self) -> String {
        match self {
            TransferEvent::Progress { kind, .. } => format!("{}:progress", kind.prefix()),
            TransferEvent::Complete { kind, .. } => format!("{}:complete", kind.prefix()),
            TransferEvent::Cancelled { kind, .. } => format!("{}:cancelled", kind.prefix()),
            TransferEvent::Warning { kind, .. } => format!("{}:warning", kind.prefix()),
            TransferEvent::Paused { .. } => "transfer:paused".to_string(),
            TransferEvent::Resumed { .. } => "transfer:resumed".to_string(),
        }
    }

    /// `{"event": <name>, "payload": {...}}` for observers that speak JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "event": self.name(),
            "payload": self,
        })
    }
}

/// Receives engine events. Implementations must not block.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

/// Forwards events into an unbounded channel.
///
/// A dropped receiver silently discards further events.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressEmitter for ChannelEmitter {
    fn emit(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl ProgressEmitter for TracingEmitter {
    fn emit(&self, event: TransferEvent) {
        match &event {
            TransferEvent::Progress { progress, .. } => debug!(
                "{} {}/{} ({}/{})",
                event.name(),
                progress.current,
                progress.total,
                progress.batch_index + 1,
                progress.batch_total
            ),
            TransferEvent::Warning { message, .. } => warn!("{}: {}", event.name(), message),
            _ => info!("{}", event.to_json()),
        }
    }
}

/// Per-job progress bookkeeping
pub struct ProgressReporter {
    emitter: Arc<dyn ProgressEmitter>,
    kind: TransferKind,
    job_id: String,
    batch_total: usize,
    batch_index: usize,
    current: u64,
    total: i64,
    item_base: u64,
    item_processed: u64,
    item_total: i64,
}

impl ProgressReporter {
    /// Create a reporter for one job
    ///
    /// # Arguments
    /// * `emitter` - Destination for events
    /// * `kind` - Export or import
    /// * `job_id` - Id the job's cancellation token is registered under
    /// * `batch_total` - Number of entries in the job's batch
    pub fn new(
        emitter: Arc<dyn ProgressEmitter>,
        kind: TransferKind,
        job_id: impl Into<String>,
        batch_total: usize,
    ) -> Self {
        Self {
            emitter,
            kind,
            job_id: job_id.into(),
            batch_total,
            batch_index: 0,
            current: 0,
            total: -1,
            item_base: 0,
            item_processed: 0,
            item_total: -1,
        }
    }

    /// Set the job-wide record total. `None` means indeterminate.
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total.map(|t| t.max(self.current) as i64).unwrap_or(-1);
    }

    /// Start reporting for batch entry `index`.
    pub fn begin_item(&mut self, index: usize, item_total: Option<u64>) {
        self.batch_index = index;
        self.item_base = self.current;
        self.item_processed = 0;
        self.item_total = item_total.map(|t| t as i64).unwrap_or(-1);
    }

    /// Report `item_processed` records done in the current batch entry.
    ///
    /// Values lower than an earlier report are ignored; totals grow when a
    /// count overtakes a pre-scanned estimate.
    pub fn report(
        &mut self,
        phase: TransferPhase,
        database: Option<&str>,
        collection: Option<&str>,
        item_processed: u64,
    ) {
        self.item_processed = self.item_processed.max(item_processed);
        if self.item_total >= 0 && self.item_processed as i64 > self.item_total {
            self.item_total = self.item_processed as i64;
        }

        self.current = self.current.max(self.item_base + self.item_processed);
        if self.total >= 0 && self.current as i64 > self.total {
            self.total = self.current as i64;
        }

        let progress = ProgressEvent {
            job_id: self.job_id.clone(),
            phase,
            database: database.map(str::to_string),
            collection: collection.map(str::to_string),
            current: self.current,
            total: self.total,
            batch_index: self.batch_index,
            batch_total: self.batch_total,
            processed_records: self.item_processed,
            total_records: self.item_total,
        };
        self.emitter.emit(TransferEvent::Progress {
            kind: self.kind,
            progress,
        });
    }

    /// Emit a non-fatal warning
    pub fn warn(&self, message: impl Into<String>, skipped: Option<u64>) {
        self.emitter.emit(TransferEvent::Warning {
            kind: self.kind,
            job_id: self.job_id.clone(),
            message: message.into(),
            skipped,
        });
    }

    /// Emit the terminal completion event
    pub fn complete(&self, output_path: PathBuf, records: u64, failed: u64) {
        self.emitter.emit(TransferEvent::Complete {
            kind: self.kind,
            job_id: self.job_id.clone(),
            output_path,
            records,
            failed,
        });
    }

    /// Emit the terminal cancellation event
    pub fn cancelled(&self) {
        self.emitter.emit(TransferEvent::Cancelled {
            kind: self.kind,
            job_id: self.job_id.clone(),
        });
    }
}
