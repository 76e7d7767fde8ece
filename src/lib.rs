//! mongoport library
//!
//! Export/import orchestration for MongoDB: plans export jobs from a user's
//! selection, runs them through an in-process streaming exporter or the
//! MongoDB Database Tools, restores archives and dump directories, and
//! reports progress to an observer with cooperative pause and cancellation.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and console rendering
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management and the tool URI builder
//! - `error`: Error types and handling
//! - `transfer`: Job planning, engines, control and progress
//! - `utils`: Credential masking, path and formatting helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mongoport::{Config, ConnectionManager, TransferEngine};
//! use mongoport::transfer::{ExportRequest, Selection, TracingEmitter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let uri = "mongodb://localhost:27017".to_string();
//!     let manager = ConnectionManager::new(uri.clone(), config.connection.clone());
//!     let engine = TransferEngine::new(config, Arc::new(manager), Arc::new(TracingEmitter));
//!
//!     engine
//!         .export(ExportRequest {
//!             uri,
//!             selection: Selection::database("shop"),
//!             output: Some("shop.zip".into()),
//!             ..ExportRequest::default()
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{Result, TransferError};
pub use transfer::{TransferEngine, TransferOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
