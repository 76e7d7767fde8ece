//! Export/import orchestration
//!
//! # Architecture
//!
//! 1. **Job planning** ([`job`]): a [`Selection`] becomes a [`JobBatch`]
//! 2. **Execution**: each batch entry runs either through the native path
//!    ([`native`]) or an external tool ([`runner`], [`tools`], [`diagnostics`])
//! 3. **Control** ([`control`]): one cancellation token per job, one shared pause gate
//! 4. **Reporting** ([`progress`]): events to an external observer
//!
//! [`TransferEngine`] ties these together. Entries of one batch run strictly
//! one after another because they share the output target.

pub mod classify;
pub mod control;
pub mod diagnostics;
pub mod engine;
pub mod job;
pub mod native;
pub mod progress;
pub mod results;
pub mod runner;
pub mod tools;

pub use classify::{ImportSource, classify};
pub use control::{JobHandle, PauseGate, TransferControl};
pub use engine::{
    Backend, ExportRequest, ExportSummary, ImportRequest, ImportSummary, TransferEngine,
    TransferOutcome,
};
pub use job::{JobBatch, Namespace, OutputTarget, Selection, TransferJob, plan_jobs};
pub use native::ImportOptions;
pub use progress::{
    ChannelEmitter, ProgressEmitter, ProgressEvent, TracingEmitter, TransferEvent, TransferKind,
    TransferPhase,
};
pub use results::{ArchivePreview, ImportResult};
