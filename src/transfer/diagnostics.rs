//! Recognition of the external tools' diagnostic lines
//!
//! `mongodump` and `mongorestore` report progress on stderr. Each line is
//! tried against a small table of patterns; the first match is converted to a
//! [`DiagnosticLine`]. Lines matching nothing are opaque context for error
//! reports and never an error on their own.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::job::Namespace;

/// A recognized diagnostic line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticLine {
    /// `done dumping db.coll (N documents)`
    DumpDone { namespace: Namespace, records: u64 },

    /// `finished restoring db.coll (N documents, M failures)`
    RestoreDone {
        namespace: Namespace,
        records: u64,
        failures: u64,
    },

    /// `N document(s) restored successfully. M document(s) failed to restore.`
    RestoreSummary { restored: u64, failed: u64 },

    /// `M document(s) failed to restore.` on its own
    RestoreFailures { failed: u64 },

    /// `continuing through error: ...`
    ContinuingThroughError(String),

    /// `archive prelude db.coll`
    ArchivePrelude(Namespace),

    /// `[####....]  db.coll  101/1000  (10.1%)`
    NamespaceProgress {
        namespace: Namespace,
        current: u64,
        total: u64,
    },

    /// `Failed: ...`
    Failed(String),
}

struct LinePattern {
    regex: Regex,
    extract: fn(&Captures<'_>) -> Option<DiagnosticLine>,
}

fn number(caps: &Captures<'_>, name: &str) -> Option<u64> {
    caps.name(name)?.as_str().parse().ok()
}

fn namespace(caps: &Captures<'_>) -> Option<Namespace> {
    Namespace::parse(caps.name("ns")?.as_str())
}

fn text(caps: &Captures<'_>) -> Option<String> {
    Some(caps.name("msg")?.as_str().trim().to_string())
}

static PATTERNS: LazyLock<Vec<LinePattern>> = LazyLock::new(|| {
    let table: [(&str, fn(&Captures<'_>) -> Option<DiagnosticLine>); 8] = [
        (r"done dumping (?P<ns>\S+) \((?P<n>\d+) documents?\)", |c| {
            Some(DiagnosticLine::DumpDone {
                namespace: namespace(c)?,
                records: number(c, "n")?,
            })
        }),
        (
            r"finished restoring (?P<ns>\S+) \((?P<n>\d+) documents?, (?P<f>\d+) failures?\)",
            |c| {
                Some(DiagnosticLine::RestoreDone {
                    namespace: namespace(c)?,
                    records: number(c, "n")?,
                    failures: number(c, "f")?,
                })
            },
        ),
        (
            r"(?P<n>\d+) document\(s\) restored successfully\.(?:\s+(?P<f>\d+) document\(s\) failed to restore\.?)?",
            |c| {
                Some(DiagnosticLine::RestoreSummary {
                    restored: number(c, "n")?,
                    failed: number(c, "f").unwrap_or(0),
                })
            },
        ),
        (r"(?P<f>\d+) document\(s\) failed to restore", |c| {
            Some(DiagnosticLine::RestoreFailures {
                failed: number(c, "f")?,
            })
        }),
        (r"continuing through error: (?P<msg>.+)$", |c| {
            Some(DiagnosticLine::ContinuingThroughError(text(c)?))
        }),
        (r"archive prelude (?P<ns>\S+)", |c| {
            Some(DiagnosticLine::ArchivePrelude(namespace(c)?))
        }),
        (
            r"\[[#.]*\]\s+(?P<ns>\S+)\s+(?P<cur>\d+)/(?P<tot>\d+)\s",
            |c| {
                Some(DiagnosticLine::NamespaceProgress {
                    namespace: namespace(c)?,
                    current: number(c, "cur")?,
                    total: number(c, "tot")?,
                })
            },
        ),
        (r"Failed: (?P<msg>.+)$", |c| {
            Some(DiagnosticLine::Failed(text(c)?))
        }),
    ];

    table
        .into_iter()
        .filter_map(|(pattern, extract)| match Regex::new(pattern) {
            Ok(regex) => Some(LinePattern { regex, extract }),
            Err(e) => {
                tracing::error!("invalid diagnostic pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Recognize one diagnostic line. The first matching pattern wins.
pub fn parse_line(line: &str) -> Option<DiagnosticLine> {
    PATTERNS.iter().find_map(|pattern| {
        pattern
            .regex
            .captures(line)
            .and_then(|caps| (pattern.extract)(&caps))
    })
}
