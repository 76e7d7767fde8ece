//! Job planning
//!
//! A user selection is expanded into an ordered list of [`TransferJob`]s and
//! an output target. Jobs of one batch run strictly in order because they
//! share the output target.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectionError};
use crate::utils::paths::{sanitize_file_component, strip_archive_extension, with_extension_if_missing};

/// File stem used for a job that dumps the whole server
pub const EVERYTHING_STEM: &str = "all";

/// One atomic unit of transfer work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    pub database: Option<String>,
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_collections: Vec<String>,
}

impl TransferJob {
    /// Dump everything the server holds
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    pub fn collection(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            collection: Some(collection.into()),
            excluded_collections: Vec::new(),
        }
    }

    pub fn database_excluding(database: impl Into<String>, excluded: Vec<String>) -> Self {
        Self {
            database: Some(database.into()),
            collection: None,
            excluded_collections: excluded,
        }
    }

    /// Whether `collection` of `database` falls inside this job.
    pub fn includes(&self, database: &str, collection: &str) -> bool {
        if let Some(db) = &self.database
            && db != database
        {
            return false;
        }
        if let Some(coll) = &self.collection
            && coll != collection
        {
            return false;
        }
        !self.excluded_collections.iter().any(|c| c == collection)
    }

    /// File stem of this job's output inside a batch directory
    pub fn file_stem(&self) -> String {
        match (&self.database, &self.collection) {
            (Some(db), Some(coll)) => format!(
                "{}.{}",
                sanitize_file_component(db),
                sanitize_file_component(coll)
            ),
            (Some(db), None) => sanitize_file_component(db),
            _ => EVERYTHING_STEM.to_string(),
        }
    }
}

impl fmt::Display for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.database, &self.collection) {
            (Some(db), Some(coll)) => write!(f, "{db}.{coll}"),
            (Some(db), None) if self.excluded_collections.is_empty() => write!(f, "{db}"),
            (Some(db), None) => write!(
                f,
                "{db} (excluding {})",
                self.excluded_collections.join(", ")
            ),
            _ => write!(f, "all databases"),
        }
    }
}

/// A `database.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Split `db.coll` at the first dot. Collection names may contain dots.
    pub fn parse(text: &str) -> Option<Self> {
        let (database, collection) = text.split_once('.')?;
        if database.is_empty() || collection.is_empty() {
            return None;
        }
        Some(Self::new(database, collection))
    }

    /// Match against an include pattern: `*`, `db.*`, `*.coll` or `db.coll`.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        let (db, coll) = pattern.split_once('.').unwrap_or((pattern, "*"));
        (db == "*" || db == self.database) && (coll == "*" || coll == self.collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// What the user picked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub databases: Vec<String>,
    pub collections: Vec<String>,
    pub excluded_collections: Vec<String>,
    /// Per-database collection exclusions
    pub exclusions: BTreeMap<String, Vec<String>>,
}

impl Selection {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn database(database: impl Into<String>) -> Self {
        Self {
            databases: vec![database.into()],
            ..Self::default()
        }
    }
}

/// Expand a selection into jobs. The first matching rule wins:
///
/// 1. per-database exclusion map: one job per database with its exclusions
/// 2. one database with excluded collections: one job
/// 3. one database with collections: one job per collection
/// 4. one database: one job
/// 5. several databases: one job per database
/// 6. nothing: one job for the whole server
///
/// Collections are only meaningful within exactly one database.
pub fn plan_jobs(selection: &Selection) -> Result<Vec<TransferJob>> {
    if !selection.exclusions.is_empty() {
        let mut databases = selection.databases.clone();
        for db in selection.exclusions.keys() {
            if !databases.contains(db) {
                databases.push(db.clone());
            }
        }
        return Ok(databases
            .into_iter()
            .map(|db| {
                let excluded = selection.exclusions.get(&db).cloned().unwrap_or_default();
                TransferJob::database_excluding(db, excluded)
            })
            .collect());
    }

    if !selection.collections.is_empty() && selection.databases.len() != 1 {
        return Err(SelectionError::CollectionsWithoutSingleDatabase {
            databases: selection.databases.len(),
        }
        .into());
    }

    let jobs = match selection.databases.as_slice() {
        [db] if !selection.excluded_collections.is_empty() => vec![TransferJob::database_excluding(
            db.clone(),
            selection.excluded_collections.clone(),
        )],
        [db] if !selection.collections.is_empty() => selection
            .collections
            .iter()
            .map(|coll| TransferJob::collection(db.clone(), coll.clone()))
            .collect(),
        [db] => vec![TransferJob::database(db.clone())],
        [] => vec![TransferJob::everything()],
        databases => databases.iter().cloned().map(TransferJob::database).collect(),
    };

    Ok(jobs)
}

/// Where a batch writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Directory(PathBuf),
}

impl OutputTarget {
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::File(path) | OutputTarget::Directory(path) => path,
        }
    }
}

/// Ordered jobs sharing one output target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobBatch {
    pub jobs: Vec<TransferJob>,
    pub target: OutputTarget,
    extension: String,
}

impl JobBatch {
    /// Plan the jobs of a selection and their output layout
    ///
    /// # Arguments
    /// * `selection` - What the user picked
    /// * `requested` - Output path chosen by the user
    /// * `extension` - Canonical archive extension without the dot
    ///
    /// # Returns
    /// * `Result<JobBatch>` - A directory target for several jobs, a file otherwise
    pub fn plan(selection: &Selection, requested: &Path, extension: &str) -> Result<Self> {
        let jobs = plan_jobs(selection)?;
        Ok(Self::with_jobs(jobs, requested, extension))
    }

    pub fn with_jobs(jobs: Vec<TransferJob>, requested: &Path, extension: &str) -> Self {
        let target = if jobs.len() > 1 {
            OutputTarget::Directory(strip_archive_extension(requested))
        } else {
            OutputTarget::File(with_extension_if_missing(requested, extension))
        };
        Self {
            jobs,
            target,
            extension: extension.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Output file for the job at `index`
    pub fn output_for(&self, index: usize) -> PathBuf {
        match &self.target {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => {
                let stem = self
                    .jobs
                    .get(index)
                    .map(TransferJob::file_stem)
                    .unwrap_or_else(|| format!("job-{index}"));
                dir.join(format!("{stem}.{}", self.extension))
            }
        }
    }

    /// Jobs paired with their output files, in execution order
    pub fn entries(&self) -> impl Iterator<Item = (usize, &TransferJob, PathBuf)> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (i, job, self.output_for(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collections_in_one_database() {
        let selection = Selection {
            databases: vec!["d".into()],
            collections: vec!["a".into(), "b".into()],
            ..Selection::default()
        };
        let jobs = plan_jobs(&selection).unwrap();
        assert_eq!(
            jobs,
            vec![TransferJob::collection("d", "a"), TransferJob::collection("d", "b")]
        );
    }

    #[test]
    fn test_exclusion_map_wins() {
        let mut exclusions = BTreeMap::new();
        exclusions.insert("b".to_string(), vec!["logs".to_string()]);
        exclusions.insert("a".to_string(), vec!["tmp".to_string()]);
        let selection = Selection {
            collections: vec!["ignored".into()],
            exclusions,
            ..Selection::default()
        };

        let jobs = plan_jobs(&selection).unwrap();
        assert_eq!(
            jobs,
            vec![
                TransferJob::database_excluding("a", vec!["tmp".into()]),
                TransferJob::database_excluding("b", vec!["logs".into()]),
            ]
        );
    }

    #[test]
    fn test_exclusions_beat_collections_for_one_database() {
        let selection = Selection {
            databases: vec!["d".into()],
            collections: vec!["a".into()],
            excluded_collections: vec!["x".into()],
            ..Selection::default()
        };
        let jobs = plan_jobs(&selection).unwrap();
        assert_eq!(jobs, vec![TransferJob::database_excluding("d", vec!["x".into()])]);
    }

    #[test]
    fn test_database_rules() {
        assert_eq!(
            plan_jobs(&Selection::database("d")).unwrap(),
            vec![TransferJob::database("d")]
        );

        let many = Selection {
            databases: vec!["x".into(), "y".into()],
            ..Selection::default()
        };
        assert_eq!(
            plan_jobs(&many).unwrap(),
            vec![TransferJob::database("x"), TransferJob::database("y")]
        );

        assert_eq!(
            plan_jobs(&Selection::everything()).unwrap(),
            vec![TransferJob::everything()]
        );
    }

    #[test]
    fn test_collections_need_one_database() {
        let selection = Selection {
            databases: vec!["x".into(), "y".into()],
            collections: vec!["a".into()],
            ..Selection::default()
        };
        assert!(plan_jobs(&selection).is_err());
    }

    #[test]
    fn test_single_job_writes_file() {
        let batch = JobBatch::plan(&Selection::database("shop"), Path::new("/out/shop"), "archive")
            .unwrap();
        assert_eq!(batch.target, OutputTarget::File(PathBuf::from("/out/shop.archive")));
        assert_eq!(batch.output_for(0), PathBuf::from("/out/shop.archive"));
    }

    #[test]
    fn test_many_jobs_write_directory() {
        let selection = Selection {
            databases: vec!["shop".into()],
            collections: vec!["orders".into(), "users".into()],
            ..Selection::default()
        };
        let batch = JobBatch::plan(&selection, Path::new("/out/backup.zip"), "zip").unwrap();

        assert_eq!(batch.target, OutputTarget::Directory(PathBuf::from("/out/backup")));
        let files: Vec<PathBuf> = batch.entries().map(|(_, _, path)| path).collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/out/backup/shop.orders.zip"),
                PathBuf::from("/out/backup/shop.users.zip"),
            ]
        );
    }

    #[test]
    fn test_namespace_parse_and_match() {
        let ns = Namespace::parse("shop.orders.2024").unwrap();
        assert_eq!(ns.database, "shop");
        assert_eq!(ns.collection, "orders.2024");
        assert!(Namespace::parse("nodot").is_none());

        assert!(ns.matches("*"));
        assert!(ns.matches("shop.*"));
        assert!(ns.matches("shop"));
        assert!(ns.matches("*.orders.2024"));
        assert!(!ns.matches("other.*"));
        assert!(!ns.matches("shop.users"));
    }

    #[test]
    fn test_job_includes() {
        let job = TransferJob::database_excluding("d", vec!["skip".into()]);
        assert!(job.includes("d", "keep"));
        assert!(!job.includes("d", "skip"));
        assert!(!job.includes("other", "keep"));
        assert!(TransferJob::everything().includes("any", "thing"));
        assert_eq!(TransferJob::everything().file_stem(), "all");
    }
}
