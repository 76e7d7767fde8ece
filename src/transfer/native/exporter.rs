//! Streaming exporter writing native archives

use std::path::{Path, PathBuf};

use bson::Document;
use tracing::{debug, info, warn};

use super::archive::{ArchiveWriter, documents_entry, encode_document};
use super::manifest::Manifest;
use super::store::DocumentSource;
use crate::error::Result;
use crate::transfer::control::{JobHandle, PollInterval};
use crate::transfer::job::{Namespace, TransferJob};
use crate::transfer::progress::{ProgressReporter, TransferPhase};

/// Name of the primary-key index, never exported
pub const PRIMARY_KEY_INDEX: &str = "_id_";

/// A collection to export and its pre-scanned size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPlan {
    pub namespace: Namespace,
    pub count: u64,
}

/// The collections one job resolves to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPlan {
    pub collections: Vec<CollectionPlan>,
}

impl ExportPlan {
    pub fn total(&self) -> u64 {
        self.collections.iter().map(|c| c.count).sum()
    }
}

/// One finished archive
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub path: PathBuf,
    pub records: u64,
    pub skipped: u64,
    pub bytes: u64,
    /// Collections left out of the manifest after a read failure
    pub incomplete: Vec<Namespace>,
}

#[derive(Debug, Clone, Copy, Default)]
struct CollectionExport {
    records: u64,
    skipped: u64,
    indexes: u64,
}

/// Exports jobs straight from the driver
pub struct NativeExporter<'a> {
    source: &'a dyn DocumentSource,
    handle: &'a JobHandle,
    batch_size: u32,
    poll_interval: u64,
}

impl<'a> NativeExporter<'a> {
    /// Create an exporter for one job
    ///
    /// # Arguments
    /// * `source` - Where documents come from
    /// * `handle` - The job's control handle, polled every `poll_interval` records
    /// * `batch_size` - Cursor batch size
    /// * `poll_interval` - Records between two pause/cancel polls
    pub fn new(
        source: &'a dyn DocumentSource,
        handle: &'a JobHandle,
        batch_size: u32,
        poll_interval: u64,
    ) -> Self {
        Self {
            source,
            handle,
            batch_size,
            poll_interval,
        }
    }

    /// Resolve a job to collections and count their documents
    pub async fn plan(&self, job: &TransferJob) -> Result<ExportPlan> {
        let databases = match &job.database {
            Some(db) => vec![db.clone()],
            None => self.source.list_databases().await?,
        };

        let mut plan = ExportPlan::default();
        for database in databases {
            self.handle.ensure_active()?;
            let collections = match &job.collection {
                Some(coll) => vec![coll.clone()],
                None => self.source.list_collections(&database).await?,
            };

            for collection in collections {
                if !job.includes(&database, &collection) {
                    continue;
                }
                self.handle.ensure_active()?;
                let count = self.source.count_documents(&database, &collection).await?;
                plan.collections.push(CollectionPlan {
                    namespace: Namespace::new(database.clone(), collection),
                    count,
                });
            }
        }

        debug!(
            "Planned {} collections ({} documents) for {}",
            plan.collections.len(),
            plan.total(),
            job
        );
        Ok(plan)
    }

    /// Write one archive holding every collection of `plan`
    ///
    /// A collection that fails to read is left out of the manifest and
    /// reported as a warning; cancellation aborts immediately. The documents
    /// already written for it stay in the container as an orphan entry, which
    /// readers ignore because they only follow the manifest.
    ///
    /// # Returns
    /// * `Result<ExportedArchive>` - The finished archive
    pub async fn export(
        &self,
        plan: &ExportPlan,
        output: &Path,
        reporter: &mut ProgressReporter,
    ) -> Result<ExportedArchive> {
        info!("Exporting {} collections to {}", plan.collections.len(), output.display());

        let mut writer = ArchiveWriter::create(output)?;
        let mut manifest = Manifest::new();
        let mut processed = 0u64;
        let mut records = 0u64;
        let mut skipped = 0u64;
        let mut incomplete = Vec::new();

        for collection in &plan.collections {
            self.handle.checkpoint().await?;
            let namespace = &collection.namespace;

            match self
                .export_collection(&mut writer, namespace, reporter, &mut processed)
                .await
            {
                Ok(done) => {
                    manifest.record(namespace, done.records, done.indexes);
                    records += done.records;
                    skipped += done.skipped;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    let message = e.masked_message();
                    warn!("Export of {} failed: {}", namespace, message);
                    reporter.warn(format!("{namespace} was not exported: {message}"), None);
                    incomplete.push(namespace.clone());
                }
            }
        }

        self.handle.ensure_active()?;
        reporter.report(TransferPhase::Finalizing, None, None, processed);
        let bytes = writer.finish(&manifest)?;

        info!(
            "Wrote {} documents to {} ({} skipped)",
            records,
            output.display(),
            skipped
        );
        Ok(ExportedArchive {
            path: output.to_path_buf(),
            records,
            skipped,
            bytes,
            incomplete,
        })
    }

    async fn export_collection(
        &self,
        writer: &mut ArchiveWriter,
        namespace: &Namespace,
        reporter: &mut ProgressReporter,
        processed: &mut u64,
    ) -> Result<CollectionExport> {
        let db = namespace.database.as_str();
        let coll = namespace.collection.as_str();

        writer.start_entry(&documents_entry(namespace))?;
        let mut stream = self.source.open_stream(db, coll, self.batch_size).await?;
        let mut poll = PollInterval::new(self.poll_interval);
        let mut done = CollectionExport::default();

        while let Some(batch) = stream.next_batch().await? {
            for raw in batch {
                match encode_document(&raw) {
                    Ok(line) => {
                        writer.write_line(&line)?;
                        done.records += 1;
                    }
                    Err(e) => {
                        done.skipped += 1;
                        debug!("Skipping document in {}: {}", namespace, e);
                    }
                }
                *processed += 1;

                if poll.tick() {
                    if let Err(e) = self.handle.checkpoint().await {
                        stream.close().await?;
                        return Err(e);
                    }
                    reporter.report(TransferPhase::Exporting, Some(db), Some(coll), *processed);
                }
            }
        }
        stream.close().await?;
        reporter.report(TransferPhase::Writing, Some(db), Some(coll), *processed);

        let indexes: Vec<Document> = self
            .source
            .list_indexes(db, coll)
            .await?
            .into_iter()
            .filter(|index| index.get_str("name").ok() != Some(PRIMARY_KEY_INDEX))
            .collect();
        writer.write_indexes(namespace, &indexes)?;
        done.indexes = indexes.len() as u64;

        if done.skipped > 0 {
            reporter.warn(
                format!(
                    "Skipped {} documents in {} that could not be serialized",
                    done.skipped, namespace
                ),
                Some(done.skipped),
            );
        }

        Ok(done)
    }
}
