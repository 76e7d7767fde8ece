//! External tool path, driven by shell scripts standing in for the tools

#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{MemoryStore, test_config};
use mongoport::TransferError;
use mongoport::config::{Config, EngineKind};
use mongoport::error::EnvironmentError;
use mongoport::transfer::{
    ChannelEmitter, ExportRequest, ImportRequest, Selection, TransferEngine, TransferEvent,
    TransferOutcome,
};

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn engine_with(config: Config) -> (TransferEngine, tokio::sync::mpsc::UnboundedReceiver<TransferEvent>) {
    let (emitter, rx) = ChannelEmitter::new();
    let store = Arc::new(MemoryStore::new());
    (TransferEngine::new(config, store, Arc::new(emitter)), rx)
}

/// Restores every archive except `bad.archive`
const FAKE_RESTORE: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --archive=*/bad.archive)
      echo "preparing collections to restore from" >&2
      echo "Failed: stream or file does not appear to be a mongodump archive" >&2
      exit 1 ;;
  esac
done
echo "finished restoring shop.orders (5 documents, 0 failures)" >&2
echo "5 document(s) restored successfully. 0 document(s) failed to restore." >&2
"#;

#[tokio::test]
async fn test_directory_restore_reports_failing_archive_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.archive"), b"garbage").unwrap();
    std::fs::write(dir.path().join("shop.archive"), b"archive bytes").unwrap();

    let mut config = test_config();
    config.tools.restore_path = Some(script(tools.path(), "mongorestore", FAKE_RESTORE));
    let (engine, mut rx) = engine_with(config);

    let outcome = engine
        .import(ImportRequest {
            uri: "mongodb://localhost:27017/shop".to_string(),
            input: Some(dir.path().to_path_buf()),
            ..ImportRequest::default()
        })
        .await
        .unwrap();

    let TransferOutcome::Imported(summary) = outcome else {
        panic!("expected an import summary");
    };
    assert_eq!(summary.result.records_inserted, 5);
    assert_eq!(summary.result.records_failed, 0);
    assert_eq!(summary.result.databases["shop"].records_inserted, 5);
    assert_eq!(summary.result.errors.len(), 1);
    let error = &summary.result.errors[0];
    assert!(error.starts_with("bad: mongorestore failed:"), "{error}");
    assert!(error.contains("does not appear to be a mongodump archive"));

    let names: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| event.name())
        .collect();
    assert!(names.contains(&"import:warning".to_string()));
    assert_eq!(names.last().map(String::as_str), Some("import:complete"));
}

#[tokio::test]
async fn test_restore_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let args_file = tools.path().join("args.txt");
    let body = format!(
        "for arg in \"$@\"; do echo \"$arg\" >> '{}'; done",
        args_file.display()
    );
    let archive = dir.path().join("shop.archive");
    std::fs::write(&archive, [0x1f, 0x8b, 0x08, 0x00]).unwrap();

    let mut config = test_config();
    config.tools.restore_path = Some(script(tools.path(), "mongorestore", &body));
    let (engine, _rx) = engine_with(config);

    engine
        .import(ImportRequest {
            uri: "mongodb://localhost:27017/shop?authSource=admin".to_string(),
            input: Some(archive.clone()),
            options: mongoport::transfer::ImportOptions {
                drop: true,
                dry_run: false,
                ns_include: vec!["shop.*".to_string()],
            },
            job_id: None,
        })
        .await
        .unwrap();

    let args: Vec<String> = std::fs::read_to_string(&args_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        args,
        vec![
            "--uri=mongodb://localhost:27017/?authSource=admin".to_string(),
            format!("--archive={}", archive.display()),
            "--gzip".to_string(),
            "--drop".to_string(),
            "--nsInclude=shop.*".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_tool_export_with_failing_dump_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let body = r#"
for arg in "$@"; do
  case "$arg" in
    --archive=*) out="${arg#--archive=}" ;;
  esac
done
echo "partial" > "$out"
echo "Failed: error connecting to db server: mongodb://admin:hunter2@db:27017" >&2
exit 1
"#;

    let mut config = test_config();
    config.tools.dump_path = Some(script(tools.path(), "mongodump", body));
    let (engine, mut rx) = engine_with(config);

    let output = dir.path().join("shop");
    let err = engine
        .export(ExportRequest {
            uri: "mongodb://localhost:27017".to_string(),
            selection: Selection::database("shop"),
            output: Some(output.clone()),
            engine: Some(EngineKind::Tool),
            ..ExportRequest::default()
        })
        .await
        .unwrap_err();

    match &err {
        TransferError::ToolFailed { tool, message } => {
            assert_eq!(tool, "mongodump");
            assert!(message.contains("admin:****@db"));
            assert!(!message.contains("hunter2"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!dir.path().join("shop.archive").exists());
    let names: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| event.name())
        .collect();
    assert!(!names.iter().any(|n| n.ends_with(":complete")));
}

#[tokio::test]
async fn test_missing_tool_is_environment_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.tools.dump_path = Some(dir.path().join("no-such-mongodump"));
    let (engine, _rx) = engine_with(config);

    let err = engine
        .export(ExportRequest {
            uri: "mongodb://localhost:27017".to_string(),
            selection: Selection::database("shop"),
            output: Some(dir.path().join("shop")),
            engine: Some(EngineKind::Tool),
            ..ExportRequest::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Environment(_)));
    assert!(
        matches!(
            err,
            TransferError::Environment(EnvironmentError::ToolPathInvalid { .. })
                | TransferError::Environment(EnvironmentError::ToolNotFound { .. })
        )
    );
}
