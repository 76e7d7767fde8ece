//! External tool resolution and command lines

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{EnvironmentError, Result};

/// The two MongoDB Database Tools the engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Dump,
    Restore,
}

impl ToolKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            ToolKind::Dump => "mongodump",
            ToolKind::Restore => "mongorestore",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Locate a tool binary
///
/// # Arguments
/// * `kind` - Which tool
/// * `configured` - Explicit path from the configuration, if any
///
/// # Returns
/// * `Result<PathBuf>` - The binary, or an environment error naming the download page
pub fn resolve_tool(kind: ToolKind, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(EnvironmentError::ToolPathInvalid {
                tool: kind.binary_name().to_string(),
                path: path.display().to_string(),
            }
            .into())
        };
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    find_in_path(kind.binary_name(), &search_path).ok_or_else(|| {
        EnvironmentError::ToolNotFound {
            tool: kind.binary_name().to_string(),
        }
        .into()
    })
}

/// Search a `PATH`-style list for an executable
pub fn find_in_path(binary: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    let file_name = if cfg!(windows) {
        format!("{binary}.exe")
    } else {
        binary.to_string()
    };

    env::split_paths(search_path)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

/// A resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// `mongodump` options
#[derive(Debug, Clone, Default)]
pub struct DumpArgs {
    pub uri: String,
    pub archive: PathBuf,
    pub gzip: bool,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub excluded_collections: Vec<String>,
}

impl DumpArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--uri={}", self.uri),
            format!("--archive={}", self.archive.display()),
        ];
        if self.gzip {
            args.push("--gzip".to_string());
        }
        if let Some(db) = &self.database {
            args.push(format!("--db={db}"));
        }
        if let Some(coll) = &self.collection {
            args.push(format!("--collection={coll}"));
        }
        for excluded in &self.excluded_collections {
            args.push(format!("--excludeCollection={excluded}"));
        }
        args
    }
}

/// What `mongorestore` reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreInput {
    Archive(PathBuf),
    Directory(PathBuf),
}

/// `mongorestore` options
#[derive(Debug, Clone)]
pub struct RestoreArgs {
    pub uri: String,
    pub input: RestoreInput,
    pub gzip: bool,
    pub drop: bool,
    pub dry_run: bool,
    pub ns_include: Vec<String>,
    pub verbose: bool,
}

impl RestoreArgs {
    pub fn new(uri: impl Into<String>, input: RestoreInput) -> Self {
        Self {
            uri: uri.into(),
            input,
            gzip: false,
            drop: false,
            dry_run: false,
            ns_include: Vec::new(),
            verbose: false,
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![format!("--uri={}", self.uri)];
        match &self.input {
            RestoreInput::Archive(path) => args.push(format!("--archive={}", path.display())),
            RestoreInput::Directory(path) => args.push(format!("--dir={}", path.display())),
        }
        if self.gzip {
            args.push("--gzip".to_string());
        }
        if self.drop {
            args.push("--drop".to_string());
        }
        if self.dry_run {
            args.push("--dryRun".to_string());
        }
        for ns in &self.ns_include {
            args.push(format!("--nsInclude={ns}"));
        }
        if self.verbose {
            args.push("-v".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_args() {
        let args = DumpArgs {
            uri: "mongodb://h/?authSource=shop".into(),
            archive: PathBuf::from("/out/shop.archive"),
            gzip: true,
            database: Some("shop".into()),
            collection: None,
            excluded_collections: vec!["logs".into(), "tmp".into()],
        }
        .to_args();

        assert_eq!(
            args,
            vec![
                "--uri=mongodb://h/?authSource=shop",
                "--archive=/out/shop.archive",
                "--gzip",
                "--db=shop",
                "--excludeCollection=logs",
                "--excludeCollection=tmp",
            ]
        );
    }

    #[test]
    fn test_restore_args() {
        let mut restore = RestoreArgs::new("mongodb://h", RestoreInput::Directory("/dump".into()));
        restore.drop = true;
        restore.ns_include = vec!["shop.*".into()];
        assert_eq!(
            restore.to_args(),
            vec!["--uri=mongodb://h", "--dir=/dump", "--drop", "--nsInclude=shop.*"]
        );

        let mut preview = RestoreArgs::new("mongodb://h", RestoreInput::Archive("/a.gz".into()));
        preview.gzip = true;
        preview.dry_run = true;
        preview.verbose = true;
        assert_eq!(
            preview.to_args(),
            vec!["--uri=mongodb://h", "--archive=/a.gz", "--gzip", "--dryRun", "-v"]
        );
    }

    #[test]
    fn test_find_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let name = if cfg!(windows) { "mongodump.exe" } else { "mongodump" };
        std::fs::write(dir.path().join(name), b"").unwrap();

        let search = env::join_paths([Path::new("/nonexistent"), dir.path()]).unwrap();
        assert_eq!(
            find_in_path("mongodump", &search),
            Some(dir.path().join(name))
        );
        assert_eq!(find_in_path("mongorestore", &search), None);
    }

    #[test]
    fn test_configured_path_must_exist() {
        let err = resolve_tool(ToolKind::Restore, Some(Path::new("/nonexistent/mongorestore")))
            .unwrap_err();
        assert!(err.to_string().contains("mongorestore"));
        assert!(err.to_string().contains(crate::error::DATABASE_TOOLS_URL));
    }
}
