//! Zip container of the native path
//!
//! Layout:
//!
//! ```text
//! {db}/{coll}/documents.jsonl   one canonical extended-JSON document per line
//! {db}/{coll}/indexes.json      JSON array of index specifications, maybe empty
//! manifest.json                 written last
//! ```
//!
//! The manifest is the table of contents. A collection whose export failed
//! halfway can leave a `documents.jsonl` entry behind that the manifest does
//! not list; importers and previews never look at such entries.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use bson::{Bson, Document, RawDocumentBuf};
use serde::Serialize;
use tokio::sync::mpsc;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::manifest::Manifest;
use crate::error::{ArchiveError, Result, TransferError};
use crate::transfer::job::Namespace;

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const DOCUMENTS_ENTRY: &str = "documents.jsonl";
pub const INDEXES_ENTRY: &str = "indexes.json";

pub fn documents_entry(namespace: &Namespace) -> String {
    format!("{}/{}/{DOCUMENTS_ENTRY}", namespace.database, namespace.collection)
}

pub fn indexes_entry(namespace: &Namespace) -> String {
    format!("{}/{}/{INDEXES_ENTRY}", namespace.database, namespace.collection)
}

/// Serialize one raw document as a canonical extended-JSON line
pub fn encode_document(raw: &RawDocumentBuf) -> Result<String> {
    let document = raw
        .to_document()
        .map_err(|e| TransferError::Serialization(e.to_string()))?;
    Ok(serde_json::to_string(
        &Bson::Document(document).into_canonical_extjson(),
    )?)
}

/// Parse one extended-JSON line back into a document
pub fn decode_document(line: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    match Bson::try_from(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(TransferError::Serialization(format!(
            "expected a document, found {:?}",
            other.element_type()
        ))),
    }
}

/// Writes one native archive
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
}

impl ArchiveWriter {
    /// Create the archive file, replacing any existing one
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            zip: ZipWriter::new(file),
        })
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true)
    }

    /// Start a new entry; following writes go into it.
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.zip.start_file(name, Self::options())?;
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.zip.write_all(line.as_bytes())?;
        self.zip.write_all(b"\n")?;
        Ok(())
    }

    /// Write a complete JSON entry
    pub fn write_json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        self.start_entry(name)?;
        let bytes = serde_json::to_vec_pretty(value)?;
        self.zip.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_indexes(&mut self, namespace: &Namespace, indexes: &[Document]) -> Result<()> {
        let specs: Vec<serde_json::Value> = indexes
            .iter()
            .map(|index| Bson::Document(index.clone()).into_canonical_extjson())
            .collect();
        self.write_json(&indexes_entry(namespace), &specs)
    }

    /// Write the manifest and close the container
    ///
    /// # Returns
    /// * `Result<u64>` - Size of the finished archive in bytes
    pub fn finish(mut self, manifest: &Manifest) -> Result<u64> {
        self.write_json(MANIFEST_ENTRY, manifest)?;
        let file = self.zip.finish()?;
        Ok(file.metadata()?.len())
    }
}

/// Reads a native archive
pub struct ArchiveReader {
    zip: ZipArchive<File>,
    path: PathBuf,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let zip = ZipArchive::new(file).map_err(|e| {
            ArchiveError::Container(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self {
            zip,
            path: path.to_path_buf(),
        })
    }

    pub fn manifest(&mut self) -> Result<Manifest> {
        let text = match self.read_entry(MANIFEST_ENTRY)? {
            Some(text) => text,
            None => return Err(ArchiveError::MissingManifest(self.path.display().to_string()).into()),
        };
        serde_json::from_str(&text).map_err(|e| ArchiveError::InvalidManifest(e.to_string()).into())
    }

    pub fn has_documents(&self, namespace: &Namespace) -> bool {
        let name = documents_entry(namespace);
        self.zip.file_names().any(|entry| entry == name)
    }

    /// Index specifications of a collection. A missing entry reads as none.
    pub fn indexes(&mut self, namespace: &Namespace) -> Result<Vec<Document>> {
        let Some(text) = self.read_entry(&indexes_entry(namespace))? else {
            return Ok(Vec::new());
        };
        let values: Vec<serde_json::Value> = serde_json::from_str(&text)?;
        values
            .into_iter()
            .map(|value| match Bson::try_from(value)? {
                Bson::Document(document) => Ok(document),
                _ => Err(TransferError::Serialization(format!(
                    "index specification of {namespace} is not a document"
                ))),
            })
            .collect()
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<String>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        Ok(Some(text))
    }
}

/// Stream the lines of an archive entry in batches.
///
/// The zip entry is read on a blocking thread; batches arrive through a small
/// bounded channel. Dropping the receiver stops the reader. Blank lines are
/// skipped.
pub fn read_entry_lines(
    path: PathBuf,
    entry: String,
    batch_lines: usize,
) -> mpsc::Receiver<Result<Vec<String>>> {
    let (tx, rx) = mpsc::channel(2);
    let batch_lines = batch_lines.max(1);

    tokio::task::spawn_blocking(move || {
        let send_lines = || -> Result<()> {
            let file = File::open(&path)?;
            let mut zip = ZipArchive::new(file)?;
            let reader = BufReader::new(zip.by_name(&entry)?);

            let mut batch = Vec::with_capacity(batch_lines);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                batch.push(line);
                if batch.len() == batch_lines
                    && tx.blocking_send(Ok(std::mem::take(&mut batch))).is_err()
                {
                    return Ok(());
                }
            }
            if !batch.is_empty() {
                let _ = tx.blocking_send(Ok(batch));
            }
            Ok(())
        };

        if let Err(e) = send_lines() {
            let _ = tx.blocking_send(Err(e));
        }
    });

    rx
}
