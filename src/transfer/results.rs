//! Aggregated import results and archive previews

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use super::diagnostics::DiagnosticLine;
use super::job::Namespace;

/// Per-database record counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTally {
    pub records_inserted: u64,
    pub records_failed: u64,
}

/// Outcome of an import, possibly over several archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub records_inserted: u64,
    pub records_failed: u64,
    pub databases: BTreeMap<String, DatabaseTally>,
    /// Deduplicated, masked error messages
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count records for one namespace
    pub fn record(&mut self, database: &str, inserted: u64, failed: u64) {
        self.records_inserted += inserted;
        self.records_failed += failed;
        let tally = self.databases.entry(database.to_string()).or_default();
        tally.records_inserted += inserted;
        tally.records_failed += failed;
    }

    /// Keep an error message unless the exact text is already present.
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ImportResult) {
        self.records_inserted += other.records_inserted;
        self.records_failed += other.records_failed;
        for (db, tally) in other.databases {
            let entry = self.databases.entry(db).or_default();
            entry.records_inserted += tally.records_inserted;
            entry.records_failed += tally.records_failed;
        }
        for error in other.errors {
            self.add_error(error);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.records_failed == 0 && self.errors.is_empty()
    }
}

/// Builds an [`ImportResult`] from one restore tool run.
///
/// Per-namespace lines give the database breakdown; the tool's closing
/// summary, when present, is authoritative for the totals.
#[derive(Debug, Default)]
pub struct RestoreTally {
    result: ImportResult,
    summary: Option<(u64, u64)>,
    extra_failures: Option<u64>,
}

impl RestoreTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records restored so far according to per-namespace lines
    pub fn restored(&self) -> u64 {
        self.result.records_inserted
    }

    /// Apply one recognized line. Returns the namespace it finished, if any.
    pub fn apply(&mut self, line: &DiagnosticLine) -> Option<Namespace> {
        match line {
            DiagnosticLine::RestoreDone {
                namespace,
                records,
                failures,
            } => {
                self.result.record(&namespace.database, *records, *failures);
                return Some(namespace.clone());
            }
            DiagnosticLine::RestoreSummary { restored, failed } => {
                self.summary = Some((*restored, *failed));
            }
            DiagnosticLine::RestoreFailures { failed } => {
                self.extra_failures = Some(*failed);
            }
            DiagnosticLine::ContinuingThroughError(message) => self.result.add_error(message.clone()),
            DiagnosticLine::Failed(message) => self.result.add_error(message.clone()),
            _ => {}
        }
        None
    }

    pub fn finish(self) -> ImportResult {
        let mut result = self.result;
        match (self.summary, self.extra_failures) {
            (Some((restored, failed)), _) => {
                result.records_inserted = restored;
                result.records_failed = failed;
            }
            (None, Some(failed)) => result.records_failed = result.records_failed.max(failed),
            (None, None) => {}
        }
        result
    }
}

/// A namespace found in an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewNamespace {
    pub database: String,
    pub collection: String,
    /// Known for native archives only
    pub record_count: Option<u64>,
}

/// Read-only listing of what an import source would restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePreview {
    pub source: PathBuf,
    pub namespaces: Vec<PreviewNamespace>,
    pub errors: Vec<String>,
    #[serde(skip)]
    seen: BTreeSet<Namespace>,
}

impl ArchivePreview {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Add a namespace; repeated namespaces are ignored.
    pub fn add(&mut self, namespace: Namespace, record_count: Option<u64>) {
        if self.seen.insert(namespace.clone()) {
            self.namespaces.push(PreviewNamespace {
                database: namespace.database,
                collection: namespace.collection,
                record_count,
            });
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    pub fn merge(&mut self, other: ArchivePreview) {
        for ns in other.namespaces {
            let count = ns.record_count;
            self.add(Namespace::new(ns.database, ns.collection), count);
        }
        for error in other.errors {
            self.add_error(error);
        }
    }

    /// Distinct database names, in first-seen order
    pub fn databases(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for ns in &self.namespaces {
            if !out.contains(&ns.database.as_str()) {
                out.push(&ns.database);
            }
        }
        out
    }
}
