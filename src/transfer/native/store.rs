//! Database seams of the native path
//!
//! The native exporter reads through a [`DocumentSource`] and the native
//! importer writes through a [`DocumentSink`]. The connection manager provides
//! the driver-backed implementation; tests use in-memory ones.

use async_trait::async_trait;
use bson::{Document, RawDocumentBuf};
use mongodb::Cursor;
use tracing::{debug, info};

use crate::error::Result;

/// Stream of raw documents fetched in batches
#[async_trait]
pub trait RecordStream: Send {
    /// Fetch the next batch of documents
    ///
    /// # Returns
    /// * `Result<Option<Vec<RawDocumentBuf>>>` - Next batch, or None if exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<RawDocumentBuf>>>;

    /// Close the stream and release server resources
    async fn close(&mut self) -> Result<()>;
}

/// Read side of the native path
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// User databases, excluding `admin`, `local` and `config`
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Collections of a database, excluding `system.*`
    async fn list_collections(&self, database: &str) -> Result<Vec<String>>;

    /// Exact document count, used for pre-scan totals
    async fn count_documents(&self, database: &str, collection: &str) -> Result<u64>;

    /// Open an unbounded cursor over every document of a collection
    async fn open_stream(
        &self,
        database: &str,
        collection: &str,
        batch_size: u32,
    ) -> Result<Box<dyn RecordStream>>;

    /// Index specifications, including the primary-key index
    async fn list_indexes(&self, database: &str, collection: &str) -> Result<Vec<Document>>;
}

/// Counts from one unordered insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Write side of the native path
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()>;

    /// Unordered insert: one bad document does not stop the rest.
    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<InsertOutcome>;

    async fn create_indexes(
        &self,
        database: &str,
        collection: &str,
        indexes: Vec<Document>,
    ) -> Result<()>;
}

/// Driver cursor adapted to [`RecordStream`]
pub struct CursorRecordStream {
    cursor: Option<Cursor<RawDocumentBuf>>,
    batch_size: u32,
    total_fetched: u64,
    namespace: String,
    closed: bool,
}

impl CursorRecordStream {
    /// Create a new cursor stream
    ///
    /// # Arguments
    /// * `cursor` - Cursor from a `find` on a raw-document collection
    /// * `batch_size` - Number of documents to fetch per batch
    /// * `namespace` - `db.coll`, for logging
    pub fn new(cursor: Cursor<RawDocumentBuf>, batch_size: u32, namespace: String) -> Self {
        Self {
            cursor: Some(cursor),
            batch_size: batch_size.max(1),
            total_fetched: 0,
            namespace,
            closed: false,
        }
    }
}

#[async_trait]
impl RecordStream for CursorRecordStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawDocumentBuf>>> {
        if self.closed {
            return Ok(None);
        }

        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut batch = Vec::with_capacity(self.batch_size as usize);

        // Raw bytes are copied without decoding; decode failures are counted
        // per document by the exporter.
        for _ in 0..self.batch_size {
            match cursor.advance().await {
                Ok(true) => batch.push(cursor.current().to_raw_document_buf()),
                Ok(false) => break,
                Err(e) => {
                    self.cursor = None;
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }

        if batch.is_empty() {
            debug!(
                "{} exhausted after {} documents",
                self.namespace, self.total_fetched
            );
            self.cursor = None;
            self.closed = true;
            Ok(None)
        } else {
            self.total_fetched += batch.len() as u64;
            debug!(
                "Fetched batch of {} documents from {} (total: {})",
                batch.len(),
                self.namespace,
                self.total_fetched
            );
            Ok(Some(batch))
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.cursor = None;
            self.closed = true;
            info!(
                "Closed cursor on {} after {} documents",
                self.namespace, self.total_fetched
            );
        }
        Ok(())
    }
}

/// Batches served from memory
pub struct VecRecordStream {
    batches: std::vec::IntoIter<Vec<RawDocumentBuf>>,
}

impl VecRecordStream {
    pub fn new(documents: Vec<RawDocumentBuf>, batch_size: u32) -> Self {
        let size = batch_size.max(1) as usize;
        let mut batches = Vec::new();
        let mut iter = documents.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(size).collect());
        }
        Self {
            batches: batches.into_iter(),
        }
    }
}

#[async_trait]
impl RecordStream for VecRecordStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawDocumentBuf>>> {
        Ok(self.batches.next())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
