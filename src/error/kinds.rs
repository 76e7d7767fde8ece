use std::{fmt, io};

use crate::utils::mask::mask_credentials;

/// Crate-wide `Result` type using [`TransferError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Where users can obtain `mongodump` / `mongorestore`.
pub const DATABASE_TOOLS_URL: &str = "https://www.mongodb.com/try/download/database-tools";

/// Top-level error type for transfer operations.
///
/// Only [`TransferError::Cancelled`] and [`TransferError::ToolFailed`] abort a
/// running job; document-level and per-archive failures are folded into the
/// job's counters and never surface as an error of this type.
#[derive(Debug)]
pub enum TransferError {
    /// The environment is missing something the user has to install.
    Environment(EnvironmentError),

    /// The job was cancelled through its cancellation token.
    Cancelled { job_id: String },

    /// An external tool exited unsuccessfully.
    ///
    /// `message` is already masked.
    ToolFailed { tool: String, message: String },

    /// Connection-related errors.
    Connection(ConnectionError),

    /// The requested selection cannot be planned.
    Selection(SelectionError),

    /// Archive container errors.
    Archive(ArchiveError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// JSON / BSON conversion errors.
    Serialization(String),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Environment errors. These are actionable by the user.
#[derive(Debug)]
pub enum EnvironmentError {
    /// A required external tool is not on the search path.
    ToolNotFound { tool: String },

    /// An explicitly configured tool path does not exist.
    ToolPathInvalid { tool: String, path: String },
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Invalid connection URI. Carries the masked URI.
    InvalidUri(String),

    /// Failed to establish a connection.
    ConnectionFailed(String),
}

/// Job planning errors.
#[derive(Debug)]
pub enum SelectionError {
    /// Collections were selected without exactly one database.
    CollectionsWithoutSingleDatabase { databases: usize },

    /// The input path does not exist.
    InputMissing(String),

    /// Another running job is registered under this id.
    JobIdInUse(String),
}

/// Archive container errors.
#[derive(Debug)]
pub enum ArchiveError {
    /// The zip container could not be read or written.
    Container(String),

    /// The archive has no `manifest.json` entry.
    MissingManifest(String),

    /// The manifest exists but cannot be parsed.
    InvalidManifest(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    FileUnreadable(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl TransferError {
    /// Whether this error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled { .. })
    }

    /// Build the cancellation error for a job.
    pub fn cancelled(job_id: impl Into<String>) -> Self {
        TransferError::Cancelled {
            job_id: job_id.into(),
        }
    }

    /// Rendered error text with embedded credentials redacted.
    ///
    /// Use this, not `to_string()`, for anything that reaches an observer.
    pub fn masked_message(&self) -> String {
        mask_credentials(&self.to_string())
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Environment(e) => write!(f, "{e}"),
            TransferError::Cancelled { job_id } => write!(f, "Job {job_id} was cancelled"),
            TransferError::ToolFailed { tool, message } => write!(f, "{tool} failed: {message}"),
            TransferError::Connection(e) => write!(f, "Connection error: {e}"),
            TransferError::Selection(e) => write!(f, "Invalid selection: {e}"),
            TransferError::Archive(e) => write!(f, "Archive error: {e}"),
            TransferError::Config(e) => write!(f, "Configuration error: {e}"),
            TransferError::Io(e) => write!(f, "I/O error: {e}"),
            TransferError::MongoDb(e) => write!(f, "MongoDB error: {e}"),
            TransferError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            TransferError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentError::ToolNotFound { tool } => write!(
                f,
                "{tool} was not found on PATH. Install the MongoDB Database Tools from {DATABASE_TOOLS_URL}"
            ),
            EnvironmentError::ToolPathInvalid { tool, path } => write!(
                f,
                "Configured {tool} binary does not exist: {path}. Install the MongoDB Database Tools from {DATABASE_TOOLS_URL}"
            ),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
        }
    }
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::CollectionsWithoutSingleDatabase { databases } => write!(
                f,
                "collections can only be selected within exactly one database ({databases} selected)"
            ),
            SelectionError::InputMissing(path) => write!(f, "input does not exist: {path}"),
            SelectionError::JobIdInUse(id) => write!(f, "job id {id} is already in use"),
        }
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Container(msg) => write!(f, "{msg}"),
            ArchiveError::MissingManifest(path) => write!(f, "no manifest.json in {path}"),
            ArchiveError::InvalidManifest(msg) => write!(f, "invalid manifest: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileUnreadable(msg) => write!(f, "Cannot read config file: {msg}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for TransferError {}
impl std::error::Error for EnvironmentError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for SelectionError {}
impl std::error::Error for ArchiveError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to TransferError ========================= */

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        TransferError::Io(err)
    }
}

impl From<mongodb::error::Error> for TransferError {
    fn from(err: mongodb::error::Error) -> Self {
        TransferError::MongoDb(err)
    }
}

impl From<zip::result::ZipError> for TransferError {
    fn from(err: zip::result::ZipError) -> Self {
        TransferError::Archive(ArchiveError::Container(err.to_string()))
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}

impl From<bson::extjson::de::Error> for TransferError {
    fn from(err: bson::extjson::de::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}

impl From<EnvironmentError> for TransferError {
    fn from(err: EnvironmentError) -> Self {
        TransferError::Environment(err)
    }
}

impl From<ConnectionError> for TransferError {
    fn from(err: ConnectionError) -> Self {
        TransferError::Connection(err)
    }
}

impl From<SelectionError> for TransferError {
    fn from(err: SelectionError) -> Self {
        TransferError::Selection(err)
    }
}

impl From<ArchiveError> for TransferError {
    fn from(err: ArchiveError) -> Self {
        TransferError::Archive(err)
    }
}

impl From<ConfigError> for TransferError {
    fn from(err: ConfigError) -> Self {
        TransferError::Config(err)
    }
}

impl From<String> for TransferError {
    fn from(msg: String) -> Self {
        TransferError::Generic(msg)
    }
}

impl From<&str> for TransferError {
    fn from(msg: &str) -> Self {
        TransferError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_names_install_source() {
        let err: TransferError = EnvironmentError::ToolNotFound {
            tool: "mongodump".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("mongodump"));
        assert!(msg.contains(DATABASE_TOOLS_URL));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(TransferError::cancelled("job-1").is_cancelled());
        assert!(!TransferError::Generic("x".into()).is_cancelled());
    }

    #[test]
    fn test_masked_message_hides_password() {
        let err = TransferError::ToolFailed {
            tool: "mongorestore".to_string(),
            message: "cannot reach mongodb://admin:hunter2@db:27017".to_string(),
        };
        let msg = err.masked_message();
        assert!(!msg.contains("hunter2"));
        assert!(msg.contains("admin"));
    }
}
