//! Result summaries for the terminal, rendered with tabled

use nu_ansi_term::Color as AnsiColor;
use tabled::{
    Table,
    builder::Builder,
    settings::{Alignment, Color, Modify, Style, object::Columns, object::Rows},
};

use crate::transfer::engine::{ExportSummary, ImportSummary};
use crate::transfer::{ArchivePreview, OutputTarget};
use crate::utils::format::{format_bytes, format_duration};

/// Renders engine results
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFormatter {
    use_colors: bool,
}

impl SummaryFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// One row per written archive plus a closing line
    pub fn export(&self, summary: &ExportSummary) -> String {
        let mut builder = Builder::default();
        builder.push_record(["File", "Records", "Skipped", "Size"]);
        for file in &summary.files {
            builder.push_record([
                file.path.display().to_string(),
                file.records.to_string(),
                file.skipped.to_string(),
                file.bytes.map(format_bytes).unwrap_or_else(|| "-".to_string()),
            ]);
        }

        let target = match &summary.target {
            OutputTarget::File(path) => path.display().to_string(),
            OutputTarget::Directory(path) => format!("{}/", path.display()),
        };
        let mut out = self.render(builder.build(), 1);
        for namespace in &summary.incomplete {
            out.push('\n');
            out.push_str(&self.error_line(&format!("{namespace} was not exported")));
        }
        out.push('\n');
        out.push_str(&self.status(
            summary.skipped == 0 && summary.incomplete.is_empty(),
            &format!(
                "Exported {} records to {} in {}",
                summary.records,
                target,
                format_duration(summary.elapsed)
            ),
        ));
        out
    }

    /// Per-database counts, a total row and the collected errors
    pub fn import(&self, summary: &ImportSummary) -> String {
        let result = &summary.result;
        let mut builder = Builder::default();
        builder.push_record(["Database", "Inserted", "Failed"]);
        for (database, tally) in &result.databases {
            builder.push_record([
                database.clone(),
                tally.records_inserted.to_string(),
                tally.records_failed.to_string(),
            ]);
        }
        builder.push_record([
            "total".to_string(),
            result.records_inserted.to_string(),
            result.records_failed.to_string(),
        ]);

        let mut out = self.render(builder.build(), 1);
        for error in &result.errors {
            out.push('\n');
            out.push_str(&self.error_line(error));
        }
        out.push('\n');
        out.push_str(&self.status(
            result.is_clean(),
            &format!(
                "Imported {} records from {} in {}",
                result.records_inserted,
                summary.source.display(),
                format_duration(summary.elapsed)
            ),
        ));
        out
    }

    /// Namespaces an import source would restore
    pub fn preview(&self, preview: &ArchivePreview) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Database", "Collection", "Records"]);
        for ns in &preview.namespaces {
            builder.push_record([
                ns.database.clone(),
                ns.collection.clone(),
                ns.record_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string()),
            ]);
        }

        let mut out = self.render(builder.build(), 2);
        for error in &preview.errors {
            out.push('\n');
            out.push_str(&self.error_line(error));
        }
        out.push('\n');
        out.push_str(&format!(
            "{} collections in {} databases",
            preview.namespaces.len(),
            preview.databases().len()
        ));
        out
    }

    /// Style the table; columns from `numeric_from` on are right aligned
    fn render(&self, mut table: Table, numeric_from: usize) -> String {
        table.with(Style::modern());
        table.with(Modify::new(Columns::new(numeric_from..)).with(Alignment::right()));
        table.with(Modify::new(Rows::first()).with(Alignment::center()));
        if self.use_colors {
            table.modify(Rows::first(), Color::FG_CYAN | Color::BOLD);
        }
        table.to_string()
    }

    fn status(&self, clean: bool, message: &str) -> String {
        if !self.use_colors {
            return message.to_string();
        }
        let color = if clean {
            AnsiColor::Green
        } else {
            AnsiColor::Yellow
        };
        color.paint(message).to_string()
    }

    fn error_line(&self, message: &str) -> String {
        if self.use_colors {
            format!("{} {}", AnsiColor::Red.bold().paint("error:"), message)
        } else {
            format!("error: {}", message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::ImportResult;
    use crate::transfer::Namespace;
    use crate::transfer::engine::ExportedFile;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_export_summary() {
        let summary = ExportSummary {
            job_id: "job".into(),
            target: OutputTarget::Directory(PathBuf::from("/tmp/out")),
            files: vec![ExportedFile {
                path: PathBuf::from("/tmp/out/shop.zip"),
                records: 42,
                skipped: 0,
                bytes: Some(2048),
                incomplete: Vec::new(),
            }],
            records: 42,
            skipped: 0,
            incomplete: Vec::new(),
            elapsed: Duration::from_secs(3),
        };
        let text = SummaryFormatter::new(false).export(&summary);
        assert!(text.contains("/tmp/out/shop.zip"));
        assert!(text.contains("42"));
        assert!(text.contains("Exported 42 records to /tmp/out/ in 3s"));
        assert!(!text.contains("error:"));
    }

    #[test]
    fn test_export_summary_lists_collections_not_exported() {
        let lost = Namespace::new("shop", "orders");
        let summary = ExportSummary {
            job_id: "job".into(),
            target: OutputTarget::File(PathBuf::from("/tmp/shop.zip")),
            files: vec![ExportedFile {
                path: PathBuf::from("/tmp/shop.zip"),
                records: 5,
                skipped: 0,
                bytes: None,
                incomplete: vec![lost.clone()],
            }],
            records: 5,
            skipped: 0,
            incomplete: vec![lost],
            elapsed: Duration::from_secs(1),
        };
        let text = SummaryFormatter::new(false).export(&summary);
        assert!(text.contains("error: shop.orders was not exported"));
        assert!(text.contains("Exported 5 records to /tmp/shop.zip in 1s"));
    }

    #[test]
    fn test_import_summary_lists_errors() {
        let mut result = ImportResult::new();
        result.record("shop", 10, 1);
        result.add_error("bad.archive: mongorestore failed: Failed: corrupt");
        let summary = ImportSummary {
            job_id: "job".into(),
            source: PathBuf::from("/backups"),
            result,
            elapsed: Duration::from_millis(250),
        };
        let text = SummaryFormatter::new(false).import(&summary);
        assert!(text.contains("shop"));
        assert!(text.contains("total"));
        assert!(text.contains("error: bad.archive: mongorestore failed: Failed: corrupt"));
        assert!(text.ends_with("Imported 10 records from /backups in 250ms"));
    }

    #[test]
    fn test_preview_unknown_counts() {
        let mut preview = ArchivePreview::new("/backups/a.archive");
        preview.add(Namespace::new("shop", "orders"), None);
        preview.add(Namespace::new("shop", "users"), Some(7));
        let text = SummaryFormatter::new(false).preview(&preview);
        assert!(text.contains("orders"));
        assert!(text.contains('?'));
        assert!(text.contains("2 collections in 1 databases"));
    }
}
