//! Importer for native archives

use std::path::Path;

use tracing::{debug, info, warn};

use super::archive::{ArchiveReader, decode_document, documents_entry, read_entry_lines};
use super::store::DocumentSink;
use crate::error::Result;
use crate::transfer::control::{JobHandle, PollInterval};
use crate::transfer::job::Namespace;
use crate::transfer::progress::{ProgressReporter, TransferPhase};
use crate::transfer::results::ImportResult;

/// Options shared by every archive of one import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Drop each target collection before inserting
    pub drop: bool,
    /// Parse and count without writing
    pub dry_run: bool,
    /// Include patterns (`db.*`, `db.coll`, `*`); empty means everything
    pub ns_include: Vec<String>,
}

impl ImportOptions {
    pub fn includes(&self, namespace: &Namespace) -> bool {
        self.ns_include.is_empty() || self.ns_include.iter().any(|p| namespace.matches(p))
    }
}

/// Restores native archives through a [`DocumentSink`]
pub struct NativeImporter<'a> {
    sink: &'a dyn DocumentSink,
    handle: &'a JobHandle,
    batch_size: u32,
    poll_interval: u64,
    options: &'a ImportOptions,
}

#[derive(Debug, Default)]
struct CollectionImport {
    inserted: u64,
    failed: u64,
    unparsable: u64,
}

impl<'a> NativeImporter<'a> {
    pub fn new(
        sink: &'a dyn DocumentSink,
        handle: &'a JobHandle,
        batch_size: u32,
        poll_interval: u64,
        options: &'a ImportOptions,
    ) -> Self {
        Self {
            sink,
            handle,
            batch_size,
            poll_interval,
            options,
        }
    }

    /// Import one archive
    ///
    /// # Arguments
    /// * `path` - A zip written by the native exporter
    /// * `index` - Position of this archive in the batch
    /// * `reporter` - The job's progress reporter
    ///
    /// # Returns
    /// * `Result<ImportResult>` - Counts and per-namespace errors; container errors fail the archive
    pub async fn import(
        &self,
        path: &Path,
        index: usize,
        reporter: &mut ProgressReporter,
    ) -> Result<ImportResult> {
        let mut reader = ArchiveReader::open(path)?;
        let manifest = reader.manifest()?;
        let namespaces: Vec<(Namespace, u64)> = manifest
            .namespaces()
            .into_iter()
            .filter(|(ns, _)| self.options.includes(ns))
            .collect();
        let total: u64 = namespaces.iter().map(|(_, count)| count).sum();

        info!(
            "Importing {} collections from {}",
            namespaces.len(),
            path.display()
        );
        reporter.begin_item(index, Some(total));

        let mut result = ImportResult::new();
        let mut processed = 0u64;

        for (namespace, _) in namespaces {
            self.handle.checkpoint().await?;

            if !reader.has_documents(&namespace) {
                result.add_error(format!("{namespace}: documents entry is missing"));
                continue;
            }

            if self.options.drop && !self.options.dry_run {
                self.sink
                    .drop_collection(&namespace.database, &namespace.collection)
                    .await?;
            }

            let done = self
                .import_collection(path, &namespace, &mut result, reporter, &mut processed)
                .await?;
            result.record(&namespace.database, done.inserted, done.failed);
            if done.unparsable > 0 {
                result.add_error(format!(
                    "{namespace}: {} lines could not be parsed",
                    done.unparsable
                ));
            }

            let indexes = reader.indexes(&namespace)?;
            if !indexes.is_empty() && !self.options.dry_run {
                if let Err(e) = self
                    .sink
                    .create_indexes(&namespace.database, &namespace.collection, indexes)
                    .await
                {
                    warn!("Index creation on {} failed: {}", namespace, e.masked_message());
                    result.add_error(format!("{namespace}: {}", e.masked_message()));
                }
            }
        }

        Ok(result)
    }

    async fn import_collection(
        &self,
        path: &Path,
        namespace: &Namespace,
        result: &mut ImportResult,
        reporter: &mut ProgressReporter,
        processed: &mut u64,
    ) -> Result<CollectionImport> {
        let db = namespace.database.as_str();
        let coll = namespace.collection.as_str();
        let mut batches = read_entry_lines(
            path.to_path_buf(),
            documents_entry(namespace),
            self.batch_size as usize,
        );
        let mut poll = PollInterval::new(self.poll_interval);
        let mut done = CollectionImport::default();

        while let Some(lines) = batches.recv().await {
            let mut documents = Vec::with_capacity(self.batch_size as usize);
            for line in lines? {
                match decode_document(&line) {
                    Ok(document) => documents.push(document),
                    Err(e) => {
                        done.failed += 1;
                        done.unparsable += 1;
                        debug!("Unparsable line in {}: {}", namespace, e);
                    }
                }
                *processed += 1;

                if poll.tick() {
                    self.handle.checkpoint().await?;
                    reporter.report(TransferPhase::Importing, Some(db), Some(coll), *processed);
                }
            }

            if documents.is_empty() {
                continue;
            }
            if self.options.dry_run {
                done.inserted += documents.len() as u64;
                continue;
            }

            let outcome = self.sink.insert_batch(db, coll, documents).await?;
            done.inserted += outcome.inserted;
            done.failed += outcome.failed;
            for error in outcome.errors {
                result.add_error(format!("{namespace}: {error}"));
            }
        }

        reporter.report(TransferPhase::Importing, Some(db), Some(coll), *processed);
        Ok(done)
    }
}
