//! Output path helpers.

use std::path::{Path, PathBuf};

/// Extension used for archives written by the external dump tool.
pub const TOOL_ARCHIVE_EXTENSION: &str = "archive";

/// Extension used for archives written by the native exporter.
pub const NATIVE_ARCHIVE_EXTENSION: &str = "zip";

/// Archive-style suffixes, longest first so `.archive.gz` wins over `.gz`.
const ARCHIVE_SUFFIXES: &[&str] = &[".archive.gz", ".archive", ".agz", ".zip", ".gz"];

/// Suffixes of the per-collection payload files inside a raw dump directory.
const PAYLOAD_SUFFIXES: &[&str] = &[".bson.gz", ".metadata.json.gz", ".json.gz"];

fn file_name_lower(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
}

fn archive_suffix(name: &str) -> Option<&'static str> {
    if PAYLOAD_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return None;
    }
    ARCHIVE_SUFFIXES
        .iter()
        .copied()
        .find(|s| name.ends_with(s) && name.len() > s.len())
}

/// Whether the path names a single-file archive.
///
/// Compressed collection payloads of a raw dump (`*.bson.gz`) are not archives.
pub fn is_archive_file(path: &Path) -> bool {
    file_name_lower(path)
        .as_deref()
        .and_then(archive_suffix)
        .is_some()
}

/// Whether the path names a gzip-compressed raw dump payload.
pub fn is_compressed_payload(path: &Path) -> bool {
    file_name_lower(path)
        .map(|name| PAYLOAD_SUFFIXES.iter().any(|s| name.ends_with(s)))
        .unwrap_or(false)
}

/// Whether the path names a native (zip) archive.
pub fn is_native_archive(path: &Path) -> bool {
    file_name_lower(path)
        .map(|name| name.ends_with(&format!(".{NATIVE_ARCHIVE_EXTENSION}")))
        .unwrap_or(false)
}

/// Strip any archive-style extension from the path.
///
/// # Arguments
/// * `path` - Requested output path, e.g. `backup.archive.gz`
///
/// # Returns
/// * `PathBuf` - Path without the archive suffix, e.g. `backup`
pub fn strip_archive_extension(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    match archive_suffix(&name.to_lowercase()) {
        Some(suffix) => path.with_file_name(&name[..name.len() - suffix.len()]),
        None => path.to_path_buf(),
    }
}

/// Append `.{extension}` unless the file name already ends with it.
pub fn with_extension_if_missing(path: &Path, extension: &str) -> PathBuf {
    let suffix = format!(".{}", extension.to_lowercase());
    match file_name_lower(path) {
        Some(name) if name.ends_with(&suffix) => path.to_path_buf(),
        Some(_) => {
            let mut raw = path.as_os_str().to_os_string();
            raw.push(&suffix);
            PathBuf::from(raw)
        }
        None => path.join(format!("export{suffix}")),
    }
}

/// Namespace-ish label for an archive file: its name without the archive suffix.
pub fn archive_label(path: &Path) -> String {
    strip_archive_extension(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Replace characters that are not safe in a file name.
pub fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_archive_extension() {
        assert_eq!(
            strip_archive_extension(Path::new("/tmp/backup.archive")),
            PathBuf::from("/tmp/backup")
        );
        assert_eq!(
            strip_archive_extension(Path::new("/tmp/backup.archive.gz")),
            PathBuf::from("/tmp/backup")
        );
        assert_eq!(
            strip_archive_extension(Path::new("backup.zip")),
            PathBuf::from("backup")
        );
        assert_eq!(
            strip_archive_extension(Path::new("backup")),
            PathBuf::from("backup")
        );
    }

    #[test]
    fn test_with_extension_if_missing() {
        assert_eq!(
            with_extension_if_missing(Path::new("out"), "archive"),
            PathBuf::from("out.archive")
        );
        assert_eq!(
            with_extension_if_missing(Path::new("out.ARCHIVE"), "archive"),
            PathBuf::from("out.ARCHIVE")
        );
        assert_eq!(
            with_extension_if_missing(Path::new("out.v1"), "zip"),
            PathBuf::from("out.v1.zip")
        );
    }

    #[test]
    fn test_archive_detection() {
        assert!(is_archive_file(Path::new("a.archive")));
        assert!(is_archive_file(Path::new("a.agz")));
        assert!(is_archive_file(Path::new("a.zip")));
        assert!(!is_archive_file(Path::new("users.bson.gz")));
        assert!(!is_archive_file(Path::new("users.metadata.json.gz")));
        assert!(!is_archive_file(Path::new("users.bson")));
        assert!(is_compressed_payload(Path::new("users.bson.gz")));
        assert!(is_native_archive(Path::new("x.ZIP")));
    }

    #[test]
    fn test_archive_label() {
        assert_eq!(archive_label(Path::new("/d/shop.orders.archive")), "shop.orders");
        assert_eq!(archive_label(Path::new("/d/shop.zip")), "shop");
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("a/b:c"), "a_b_c");
        assert_eq!(sanitize_file_component("orders"), "orders");
    }
}
