//! Import source classification

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, SelectionError};
use crate::utils::paths::{is_archive_file, is_compressed_payload};

/// The three shapes an import path can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// A single archive file
    Archive(PathBuf),

    /// A directory of archives, each restored independently. Sorted by name.
    ArchiveDirectory(Vec<PathBuf>),

    /// A raw per-collection dump directory
    DumpDirectory { path: PathBuf, gzip: bool },
}

/// Classify an import path
///
/// # Arguments
/// * `path` - File or directory chosen by the user
/// * `max_depth` - How deep to look for compressed payloads in a dump directory
///
/// # Returns
/// * `Result<ImportSource>` - The import shape, or an error if `path` does not exist
pub fn classify(path: &Path, max_depth: usize) -> Result<ImportSource> {
    let metadata = fs::metadata(path)
        .map_err(|_| SelectionError::InputMissing(path.display().to_string()))?;

    if !metadata.is_dir() {
        return Ok(ImportSource::Archive(path.to_path_buf()));
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_archive_file(&entry.path()) {
            archives.push(entry.path());
        }
    }

    if !archives.is_empty() {
        archives.sort();
        return Ok(ImportSource::ArchiveDirectory(archives));
    }

    Ok(ImportSource::DumpDirectory {
        path: path.to_path_buf(),
        gzip: contains_compressed_payload(path, max_depth),
    })
}

/// Bounded walk for `*.bson.gz`-style payloads. Symlinks are not followed.
pub fn contains_compressed_payload(root: &Path, max_depth: usize) -> bool {
    WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file() && is_compressed_payload(entry.path()))
}

/// Whether the file starts with the gzip magic bytes.
pub fn is_gzip_file(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    Ok(read == 2 && magic == [0x1f, 0x8b])
}
