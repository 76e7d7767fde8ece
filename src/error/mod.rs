//! Error handling for transfer operations.
//!
//! Errors fall into a small taxonomy:
//! - environment problems (a required tool is missing), actionable by the user
//! - cancellation, raised only after partial output has been removed
//! - external tool failures, carrying masked recent diagnostics
//! - selection / archive / configuration problems
//!
//! Document-level decode failures and single-archive failures inside a batch
//! restore are not errors at this level; they are counted and reported in
//! the job's results instead.

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ArchiveError, ConfigError, ConnectionError, DATABASE_TOOLS_URL, EnvironmentError, Result,
    SelectionError, TransferError,
};
