//! Transfer engine
//!
//! The engine turns export/import requests into job batches and runs each
//! batch entry in order, through either the native path or the external
//! tools. It owns the cancellation registry and the pause gate, and reports
//! everything through one [`ProgressEmitter`].
//!
//! Terminal behavior:
//! - success emits `*:complete`
//! - cancellation removes the job's partial output, then emits `*:cancelled`
//! - a failure removes the output file being written and returns the error

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::classify::{ImportSource, classify, is_gzip_file};
use super::control::{JobHandle, TransferControl};
use super::diagnostics::DiagnosticLine;
use super::job::{JobBatch, Namespace, OutputTarget, Selection};
use super::native::{
    ArchiveReader, DocumentSink, DocumentSource, ExportPlan, ImportOptions, NativeExporter,
    NativeImporter,
};
use super::progress::{
    ProgressEmitter, ProgressReporter, TransferEvent, TransferKind, TransferPhase,
};
use super::results::{ArchivePreview, ImportResult, RestoreTally};
use super::runner::ProcessRunner;
use super::tools::{DumpArgs, RestoreArgs, RestoreInput, ToolInvocation, ToolKind, resolve_tool};
use crate::config::{Config, EngineKind};
use crate::connection::uri::{MechanismProbe, negotiate_auth_mechanism, strip_database_segment, tool_uri_for};
use crate::error::{Result, TransferError};
use crate::utils::paths::{NATIVE_ARCHIVE_EXTENSION, TOOL_ARCHIVE_EXTENSION, archive_label, is_native_archive};

/// Everything the engine needs from the database side
pub trait Backend: Send + Sync {
    fn source(&self) -> &dyn DocumentSource;
    fn sink(&self) -> &dyn DocumentSink;
    fn probe(&self) -> &dyn MechanismProbe;
}

impl<T> Backend for T
where
    T: DocumentSource + DocumentSink + MechanismProbe,
{
    fn source(&self) -> &dyn DocumentSource {
        self
    }

    fn sink(&self) -> &dyn DocumentSink {
        self
    }

    fn probe(&self) -> &dyn MechanismProbe {
        self
    }
}

/// A fresh job id
pub fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

/// Export request
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// Stored connection string
    pub uri: String,
    pub selection: Selection,
    /// Chosen output path; `None` when the save dialog was dismissed
    pub output: Option<PathBuf>,
    /// Overrides `transfer.engine`
    pub engine: Option<EngineKind>,
    /// Overrides `transfer.gzip` for tool dumps
    pub gzip: Option<bool>,
    /// Id to register the job under; generated when absent
    pub job_id: Option<String>,
}

/// Import request
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub uri: String,
    /// Chosen input path; `None` when the open dialog was dismissed
    pub input: Option<PathBuf>,
    pub options: ImportOptions,
    pub job_id: Option<String>,
}

/// One file written by an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub records: u64,
    pub skipped: u64,
    pub bytes: Option<u64>,
    /// Collections that failed to read and are missing from the archive
    pub incomplete: Vec<Namespace>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub job_id: String,
    pub target: OutputTarget,
    pub files: Vec<ExportedFile>,
    pub records: u64,
    pub skipped: u64,
    /// Collections of every file that could not be exported
    pub incomplete: Vec<Namespace>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub job_id: String,
    pub source: PathBuf,
    pub result: ImportResult,
    pub elapsed: Duration,
}

/// What a request ended in
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    /// The dialog was dismissed; nothing happened
    Skipped,
    Exported(ExportSummary),
    Imported(ImportSummary),
}

/// Files and directories a running export has created
#[derive(Debug, Default)]
struct OutputArtifacts {
    created_dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    current: Option<PathBuf>,
}

impl OutputArtifacts {
    fn prepare(target: &OutputTarget) -> Result<Self> {
        let mut artifacts = Self::default();
        if let OutputTarget::Directory(dir) = target
            && !dir.exists()
        {
            fs::create_dir_all(dir)?;
            artifacts.created_dir = Some(dir.clone());
        }
        Ok(artifacts)
    }

    fn begin(&mut self, path: &Path) {
        self.current = Some(path.to_path_buf());
    }

    fn commit(&mut self) {
        if let Some(path) = self.current.take() {
            self.files.push(path);
        }
    }

    fn discard_current(&mut self) {
        if let Some(path) = self.current.take() {
            remove_file_quietly(&path);
        }
        if self.files.is_empty() {
            self.remove_created_dir();
        }
    }

    fn discard_all(&mut self) {
        if let Some(path) = self.current.take() {
            remove_file_quietly(&path);
        }
        for path in self.files.drain(..) {
            remove_file_quietly(&path);
        }
        self.remove_created_dir();
    }

    fn remove_created_dir(&mut self) {
        if let Some(dir) = self.created_dir.take()
            && let Err(e) = fs::remove_dir_all(&dir)
        {
            warn!("Could not remove {}: {}", dir.display(), e);
        }
    }
}

fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Turns `mongodump` lines into progress
#[derive(Debug, Default)]
struct DumpProgress {
    completed: u64,
}

impl DumpProgress {
    fn apply(&mut self, line: &DiagnosticLine, reporter: &mut ProgressReporter) {
        match line {
            DiagnosticLine::NamespaceProgress {
                namespace, current, ..
            } => reporter.report(
                TransferPhase::Exporting,
                Some(&namespace.database),
                Some(&namespace.collection),
                self.completed + current,
            ),
            DiagnosticLine::DumpDone { namespace, records } => {
                self.completed += records;
                reporter.report(
                    TransferPhase::Exporting,
                    Some(&namespace.database),
                    Some(&namespace.collection),
                    self.completed,
                );
            }
            _ => {}
        }
    }
}

/// Export/import orchestration
pub struct TransferEngine {
    config: Config,
    backend: Arc<dyn Backend>,
    emitter: Arc<dyn ProgressEmitter>,
    control: Arc<TransferControl>,
    runner: ProcessRunner,
}

impl TransferEngine {
    /// Create an engine
    ///
    /// # Arguments
    /// * `config` - Loaded configuration
    /// * `backend` - Driver-backed source, sink and mechanism probe
    /// * `emitter` - Destination of every event
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        emitter: Arc<dyn ProgressEmitter>,
    ) -> Self {
        let runner = ProcessRunner::new(config.transfer.diagnostic_lines);
        Self {
            config,
            backend,
            emitter,
            control: TransferControl::new(),
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn control(&self) -> &Arc<TransferControl> {
        &self.control
    }

    /// Cancel one job, or every running job when `job_id` is `None`.
    pub fn cancel(&self, job_id: Option<&str>) -> usize {
        let cancelled = self.control.cancel(job_id);
        info!("Cancellation requested for {} job(s)", cancelled);
        cancelled
    }

    /// Pause every running job at its next checkpoint
    pub fn pause(&self) -> bool {
        let changed = self.control.pause();
        if changed {
            self.emitter.emit(TransferEvent::Paused {
                job_ids: self.control.active_jobs(),
            });
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.control.resume();
        if changed {
            self.emitter.emit(TransferEvent::Resumed {
                job_ids: self.control.active_jobs(),
            });
        }
        changed
    }

    /* ========================= Export ========================= */

    /// Run an export request
    ///
    /// # Returns
    /// * `Result<TransferOutcome>` - `Skipped` without an output path, `Exported` otherwise;
    ///   `Err(Cancelled)` after cleanup when the job was cancelled
    pub async fn export(&self, request: ExportRequest) -> Result<TransferOutcome> {
        let Some(output) = request.output.as_deref() else {
            info!("No export target chosen, nothing to do");
            return Ok(TransferOutcome::Skipped);
        };

        let engine = request.engine.unwrap_or(self.config.transfer.engine);
        let extension = match engine {
            EngineKind::Native => NATIVE_ARCHIVE_EXTENSION,
            EngineKind::Tool => TOOL_ARCHIVE_EXTENSION,
        };
        let batch = JobBatch::plan(&request.selection, output, extension)?;

        let job_id = request.job_id.clone().unwrap_or_else(new_job_id);
        let handle = self.control.register(&job_id)?;
        let mut reporter = ProgressReporter::new(
            Arc::clone(&self.emitter),
            TransferKind::Export,
            &job_id,
            batch.len(),
        );
        info!(
            "Export {} started: {} job(s) to {}",
            job_id,
            batch.len(),
            batch.target.path().display()
        );

        let started = Instant::now();
        let mut artifacts = OutputArtifacts::prepare(&batch.target)?;
        let outcome = match engine {
            EngineKind::Native => {
                self.export_native(&batch, &handle, &mut reporter, &mut artifacts)
                    .await
            }
            EngineKind::Tool => {
                self.export_with_tool(&request, &batch, &handle, &mut reporter, &mut artifacts)
                    .await
            }
        };

        match outcome {
            Ok(files) => {
                let records = files.iter().map(|f| f.records).sum();
                let skipped = files.iter().map(|f| f.skipped).sum();
                let incomplete: Vec<Namespace> = files
                    .iter()
                    .flat_map(|f| f.incomplete.iter().cloned())
                    .collect();
                reporter.complete(batch.target.path().to_path_buf(), records, skipped);
                if incomplete.is_empty() {
                    info!("Export {} finished: {} records", job_id, records);
                } else {
                    warn!(
                        "Export {} finished: {} records, {} collection(s) not exported",
                        job_id,
                        records,
                        incomplete.len()
                    );
                }
                Ok(TransferOutcome::Exported(ExportSummary {
                    job_id,
                    target: batch.target.clone(),
                    files,
                    records,
                    skipped,
                    incomplete,
                    elapsed: started.elapsed(),
                }))
            }
            Err(e) if e.is_cancelled() => {
                artifacts.discard_all();
                reporter.cancelled();
                info!("Export {} cancelled", job_id);
                Err(e)
            }
            Err(e) => {
                artifacts.discard_current();
                warn!("Export {} failed: {}", job_id, e.masked_message());
                Err(e)
            }
        }
    }

    async fn export_native(
        &self,
        batch: &JobBatch,
        handle: &JobHandle,
        reporter: &mut ProgressReporter,
        artifacts: &mut OutputArtifacts,
    ) -> Result<Vec<ExportedFile>> {
        let transfer = &self.config.transfer;
        let exporter = NativeExporter::new(
            self.backend.source(),
            handle,
            transfer.batch_size,
            transfer.poll_interval,
        );

        let mut plans = Vec::with_capacity(batch.len());
        for job in &batch.jobs {
            plans.push(exporter.plan(job).await?);
        }
        reporter.set_total(Some(plans.iter().map(ExportPlan::total).sum()));

        let mut files = Vec::with_capacity(batch.len());
        for ((index, _job, path), plan) in batch.entries().zip(&plans) {
            handle.checkpoint().await?;
            reporter.begin_item(index, Some(plan.total()));
            artifacts.begin(&path);

            let archive = exporter.export(plan, &path, reporter).await?;
            artifacts.commit();
            files.push(ExportedFile {
                path,
                records: archive.records,
                skipped: archive.skipped,
                bytes: Some(archive.bytes),
                incomplete: archive.incomplete,
            });
        }
        Ok(files)
    }

    async fn export_with_tool(
        &self,
        request: &ExportRequest,
        batch: &JobBatch,
        handle: &JobHandle,
        reporter: &mut ProgressReporter,
        artifacts: &mut OutputArtifacts,
    ) -> Result<Vec<ExportedFile>> {
        let program = resolve_tool(ToolKind::Dump, self.config.tools.dump_path.as_deref())?;
        let gzip = request.gzip.unwrap_or(self.config.transfer.gzip);
        let uri = negotiate_auth_mechanism(&request.uri, self.backend.probe()).await?;

        let mut files = Vec::with_capacity(batch.len());
        for (index, job, path) in batch.entries() {
            handle.checkpoint().await?;
            reporter.begin_item(index, None);
            artifacts.begin(&path);

            let args = DumpArgs {
                uri: tool_uri_for(&uri, job.database.as_deref())?,
                archive: path.clone(),
                gzip,
                database: job.database.clone(),
                collection: job.collection.clone(),
                excluded_collections: job.excluded_collections.clone(),
            };
            let invocation = ToolInvocation {
                kind: ToolKind::Dump,
                program: program.clone(),
                args: args.to_args(),
            };

            let mut progress = DumpProgress::default();
            self.runner
                .run(&invocation, handle, |_, parsed| {
                    if let Some(line) = parsed {
                        progress.apply(&line, reporter);
                    }
                })
                .await?;

            artifacts.commit();
            let bytes = fs::metadata(&path).ok().map(|m| m.len());
            files.push(ExportedFile {
                path,
                records: progress.completed,
                skipped: 0,
                bytes,
                incomplete: Vec::new(),
            });
        }
        Ok(files)
    }

    /* ========================= Import ========================= */

    /// Run an import request
    ///
    /// A directory of archives is restored entry by entry; a failing entry is
    /// recorded in the result as `"<label>: <message>"` and the rest continue.
    pub async fn import(&self, request: ImportRequest) -> Result<TransferOutcome> {
        let Some(input) = request.input.as_deref() else {
            info!("No import source chosen, nothing to do");
            return Ok(TransferOutcome::Skipped);
        };

        let source = classify(input, self.config.transfer.scan_depth)?;
        let entries = match &source {
            ImportSource::ArchiveDirectory(paths) => paths.len(),
            _ => 1,
        };

        let job_id = request.job_id.clone().unwrap_or_else(new_job_id);
        let handle = self.control.register(&job_id)?;
        let mut reporter = ProgressReporter::new(
            Arc::clone(&self.emitter),
            TransferKind::Import,
            &job_id,
            entries,
        );
        info!("Import {} started from {}", job_id, input.display());

        let started = Instant::now();
        let outcome = self
            .import_source(&request, &source, &handle, &mut reporter)
            .await;

        match outcome {
            Ok(result) => {
                reporter.complete(
                    input.to_path_buf(),
                    result.records_inserted,
                    result.records_failed,
                );
                info!(
                    "Import {} finished: {} inserted, {} failed",
                    job_id, result.records_inserted, result.records_failed
                );
                Ok(TransferOutcome::Imported(ImportSummary {
                    job_id,
                    source: input.to_path_buf(),
                    result,
                    elapsed: started.elapsed(),
                }))
            }
            Err(e) if e.is_cancelled() => {
                reporter.cancelled();
                info!("Import {} cancelled", job_id);
                Err(e)
            }
            Err(e) => {
                warn!("Import {} failed: {}", job_id, e.masked_message());
                Err(e)
            }
        }
    }

    async fn import_source(
        &self,
        request: &ImportRequest,
        source: &ImportSource,
        handle: &JobHandle,
        reporter: &mut ProgressReporter,
    ) -> Result<ImportResult> {
        let needs_tool = match source {
            ImportSource::Archive(path) => !is_native_archive(path),
            ImportSource::ArchiveDirectory(paths) => paths.iter().any(|p| !is_native_archive(p)),
            ImportSource::DumpDirectory { .. } => true,
        };
        let restore_uri = if needs_tool {
            Some(self.restore_uri(&request.uri).await?)
        } else {
            None
        };
        let restore_uri = restore_uri.as_deref();

        match source {
            ImportSource::Archive(path) => {
                self.import_archive(request, restore_uri, path, 0, handle, reporter)
                    .await
            }
            ImportSource::ArchiveDirectory(paths) => {
                let mut combined = ImportResult::new();
                for (index, path) in paths.iter().enumerate() {
                    handle.checkpoint().await?;
                    match self
                        .import_archive(request, restore_uri, path, index, handle, reporter)
                        .await
                    {
                        Ok(result) => combined.merge(result),
                        Err(e) if e.is_cancelled() || matches!(e, TransferError::Environment(_)) => {
                            return Err(e);
                        }
                        Err(e) => {
                            let message = format!("{}: {}", archive_label(path), e.masked_message());
                            warn!("Skipping archive: {}", message);
                            reporter.warn(message.clone(), None);
                            combined.add_error(message);
                        }
                    }
                }
                Ok(combined)
            }
            ImportSource::DumpDirectory { path, gzip } => {
                let mut args = self.restore_args(
                    request,
                    restore_uri,
                    RestoreInput::Directory(path.clone()),
                )?;
                args.gzip = *gzip;
                self.restore_with_tool(args, 0, handle, reporter).await
            }
        }
    }

    async fn import_archive(
        &self,
        request: &ImportRequest,
        restore_uri: Option<&str>,
        path: &Path,
        index: usize,
        handle: &JobHandle,
        reporter: &mut ProgressReporter,
    ) -> Result<ImportResult> {
        if is_native_archive(path) {
            let transfer = &self.config.transfer;
            return NativeImporter::new(
                self.backend.sink(),
                handle,
                transfer.batch_size,
                transfer.poll_interval,
                &request.options,
            )
            .import(path, index, reporter)
            .await;
        }

        let mut args =
            self.restore_args(request, restore_uri, RestoreInput::Archive(path.to_path_buf()))?;
        args.gzip = is_gzip_file(path)?;
        self.restore_with_tool(args, index, handle, reporter).await
    }

    fn restore_args(
        &self,
        request: &ImportRequest,
        restore_uri: Option<&str>,
        input: RestoreInput,
    ) -> Result<RestoreArgs> {
        let uri = restore_uri
            .ok_or_else(|| TransferError::Generic("restore URI was not prepared".to_string()))?;
        let mut args = RestoreArgs::new(uri, input);
        args.drop = request.options.drop;
        args.dry_run = request.options.dry_run;
        args.ns_include = request.options.ns_include.clone();
        Ok(args)
    }

    async fn restore_uri(&self, uri: &str) -> Result<String> {
        let negotiated = negotiate_auth_mechanism(uri, self.backend.probe()).await?;
        strip_database_segment(&negotiated)
    }

    async fn restore_with_tool(
        &self,
        args: RestoreArgs,
        index: usize,
        handle: &JobHandle,
        reporter: &mut ProgressReporter,
    ) -> Result<ImportResult> {
        let program = resolve_tool(ToolKind::Restore, self.config.tools.restore_path.as_deref())?;
        let invocation = ToolInvocation {
            kind: ToolKind::Restore,
            program,
            args: args.to_args(),
        };

        reporter.begin_item(index, None);
        let mut tally = RestoreTally::new();
        self.runner
            .run(&invocation, handle, |_, parsed| {
                if let Some(line) = parsed
                    && let Some(namespace) = tally.apply(&line)
                {
                    reporter.report(
                        TransferPhase::Importing,
                        Some(&namespace.database),
                        Some(&namespace.collection),
                        tally.restored(),
                    );
                }
            })
            .await?;

        Ok(tally.finish())
    }

    /* ========================= Preview ========================= */

    /// List what an import source would restore, without restoring it
    ///
    /// Native archives are read from their manifest, tool archives through a
    /// restore dry run, and dump directories by walking their payload files.
    pub async fn preview(&self, uri: &str, path: &Path) -> Result<ArchivePreview> {
        let source = classify(path, self.config.transfer.scan_depth)?;
        let handle = self.control.register(new_job_id())?;

        match source {
            ImportSource::Archive(archive) => self.preview_archive(uri, &archive, &handle).await,
            ImportSource::ArchiveDirectory(archives) => {
                let mut combined = ArchivePreview::new(path);
                for archive in &archives {
                    handle.checkpoint().await?;
                    match self.preview_archive(uri, archive, &handle).await {
                        Ok(preview) => combined.merge(preview),
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => combined
                            .add_error(format!("{}: {}", archive_label(archive), e.masked_message())),
                    }
                }
                Ok(combined)
            }
            ImportSource::DumpDirectory { path, .. } => {
                Ok(self.preview_dump_directory(&path))
            }
        }
    }

    async fn preview_archive(
        &self,
        uri: &str,
        path: &Path,
        handle: &JobHandle,
    ) -> Result<ArchivePreview> {
        let mut preview = ArchivePreview::new(path);

        if is_native_archive(path) {
            let manifest = ArchiveReader::open(path)?.manifest()?;
            for (namespace, count) in manifest.namespaces() {
                preview.add(namespace, Some(count));
            }
            return Ok(preview);
        }

        let mut args = RestoreArgs::new(
            self.restore_uri(uri).await?,
            RestoreInput::Archive(path.to_path_buf()),
        );
        args.gzip = is_gzip_file(path)?;
        args.dry_run = true;
        args.verbose = true;

        let invocation = ToolInvocation {
            kind: ToolKind::Restore,
            program: resolve_tool(ToolKind::Restore, self.config.tools.restore_path.as_deref())?,
            args: args.to_args(),
        };
        self.runner
            .run(&invocation, handle, |_, parsed| {
                if let Some(DiagnosticLine::ArchivePrelude(namespace)) = parsed {
                    preview.add(namespace, None);
                }
            })
            .await?;

        Ok(preview)
    }

    fn preview_dump_directory(&self, root: &Path) -> ArchivePreview {
        let mut preview = ArchivePreview::new(root);
        let mut payloads: Vec<(Namespace, PathBuf)> = WalkDir::new(root)
            .max_depth(self.config.transfer.scan_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let collection = name
                    .strip_suffix(".bson.gz")
                    .or_else(|| name.strip_suffix(".bson"))?
                    .to_string();
                let database = entry
                    .path()
                    .parent()?
                    .file_name()?
                    .to_string_lossy()
                    .into_owned();
                Some((Namespace::new(database, collection), entry.into_path()))
            })
            .collect();
        payloads.sort();

        for (namespace, _) in payloads {
            preview.add(namespace, None);
        }
        preview
    }
}
