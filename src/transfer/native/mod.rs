//! Native export/import path
//!
//! Talks to the database through the driver instead of the external tools and
//! writes self-describing zip archives:
//!
//! 1. **DocumentSource / DocumentSink**: database seams ([`store`])
//! 2. **ArchiveWriter / ArchiveReader**: the zip container ([`archive`])
//! 3. **Manifest**: what an archive actually contains ([`manifest`])
//! 4. **NativeExporter / NativeImporter**: the record loops
//!
//! Record loops poll the job's pause gate and cancellation token every
//! `poll_interval` records. There is no preemption: any new long-running step
//! inside these loops must poll as well.

pub mod archive;
pub mod exporter;
pub mod importer;
pub mod manifest;
pub mod store;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use exporter::{ExportPlan, ExportedArchive, NativeExporter};
pub use importer::{ImportOptions, NativeImporter};
pub use manifest::Manifest;
pub use store::{CursorRecordStream, DocumentSink, DocumentSource, InsertOutcome, RecordStream};
