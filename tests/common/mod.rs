//! In-memory database for engine tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, RawDocumentBuf, doc};

use mongoport::config::Config;
use mongoport::connection::uri::MechanismProbe;
use mongoport::TransferError;
use mongoport::error::Result;
use mongoport::transfer::native::store::VecRecordStream;
use mongoport::transfer::native::{DocumentSink, DocumentSource, InsertOutcome, RecordStream};

type Key = (String, String);

/// Collections, documents and indexes kept in memory
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<Key, Vec<Document>>>,
    indexes: Mutex<BTreeMap<Key, Vec<Document>>>,
    /// Raw documents streamed after the regular ones
    raw_tail: Mutex<BTreeMap<Key, Vec<RawDocumentBuf>>>,
    /// Collections whose stream errors once the first batch is served
    broken_streams: Mutex<BTreeSet<Key>>,
    /// Delay before every streamed batch
    pub batch_delay: Option<Duration>,
    /// Mechanisms reported to the URI builder
    pub mechanisms: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Add a collection with `count` documents `{_id: i, n: i}` and the primary-key index
    pub fn seed(&self, database: &str, collection: &str, count: i32) {
        let docs = (0..count).map(|i| doc! { "_id": i, "n": i }).collect();
        let key = (database.to_string(), collection.to_string());
        self.collections.lock().unwrap().insert(key.clone(), docs);
        self.indexes
            .lock()
            .unwrap()
            .insert(key, vec![doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" }]);
    }

    pub fn add_index(&self, database: &str, collection: &str, index: Document) {
        self.indexes
            .lock()
            .unwrap()
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .push(index);
    }

    /// Append a document that declares a string far longer than itself,
    /// so it cannot be turned into extended JSON
    pub fn add_unreadable_document(&self, database: &str, collection: &str) {
        let bytes = vec![12, 0, 0, 0, 0x02, b'a', 0, 0xFF, 0xFF, 0xFF, 0x7F, 0];
        let raw = RawDocumentBuf::from_bytes(bytes).unwrap();
        self.raw_tail
            .lock()
            .unwrap()
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .push(raw);
    }

    /// Make reads of a collection fail after the first batch
    pub fn break_stream_after_first_batch(&self, database: &str, collection: &str) {
        self.broken_streams
            .lock()
            .unwrap()
            .insert((database.to_string(), collection.to_string()));
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        self.indexes
            .lock()
            .unwrap()
            .get(&(database.to_string(), collection.to_string()))
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|index| index.get_str("name").ok().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Stream that serves one batch, then fails like a killed cursor
struct BrokenStream {
    inner: VecRecordStream,
    served: bool,
}

#[async_trait]
impl RecordStream for BrokenStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawDocumentBuf>>> {
        if self.served {
            return Err(TransferError::Generic("cursor killed by server".to_string()));
        }
        self.served = true;
        self.inner.next_batch().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// Stream that sleeps before each batch
struct DelayedStream {
    inner: VecRecordStream,
    delay: Duration,
}

#[async_trait]
impl RecordStream for DelayedStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<RawDocumentBuf>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.next_batch().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .lock()
            .unwrap()
            .keys()
            .map(|(db, _)| db.clone())
            .collect();
        names.dedup();
        Ok(names)
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, coll)| coll.clone())
            .collect())
    }

    async fn count_documents(&self, database: &str, collection: &str) -> Result<u64> {
        let key = (database.to_string(), collection.to_string());
        let tail = self.raw_tail.lock().unwrap().get(&key).map_or(0, Vec::len);
        Ok((self.documents(database, collection).len() + tail) as u64)
    }

    async fn open_stream(
        &self,
        database: &str,
        collection: &str,
        batch_size: u32,
    ) -> Result<Box<dyn RecordStream>> {
        let key = (database.to_string(), collection.to_string());
        let mut raw: Vec<RawDocumentBuf> = self
            .documents(database, collection)
            .iter()
            .map(|doc| RawDocumentBuf::from_document(doc).unwrap())
            .collect();
        raw.extend(self.raw_tail.lock().unwrap().get(&key).cloned().unwrap_or_default());
        let inner = VecRecordStream::new(raw, batch_size);

        if self.broken_streams.lock().unwrap().contains(&key) {
            return Ok(Box::new(BrokenStream {
                inner,
                served: false,
            }));
        }
        Ok(match self.batch_delay {
            Some(delay) => Box::new(DelayedStream { inner, delay }),
            None => Box::new(inner),
        })
    }

    async fn list_indexes(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .indexes
            .lock()
            .unwrap()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentSink for MemoryStore {
    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        let key = (database.to_string(), collection.to_string());
        self.collections.lock().unwrap().remove(&key);
        self.indexes.lock().unwrap().remove(&key);
        Ok(())
    }

    /// Rejects documents whose `_id` is already present, like a unique index
    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<InsertOutcome> {
        let mut collections = self.collections.lock().unwrap();
        let stored = collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();

        let mut outcome = InsertOutcome::default();
        for document in documents {
            let duplicate = stored
                .iter()
                .any(|existing| existing.get("_id") == document.get("_id"));
            if duplicate {
                outcome.failed += 1;
                let message = "E11000 duplicate key error".to_string();
                if !outcome.errors.contains(&message) {
                    outcome.errors.push(message);
                }
            } else {
                stored.push(document);
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn create_indexes(
        &self,
        database: &str,
        collection: &str,
        indexes: Vec<Document>,
    ) -> Result<()> {
        self.indexes
            .lock()
            .unwrap()
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(indexes);
        Ok(())
    }
}

#[async_trait]
impl MechanismProbe for MemoryStore {
    async fn supported_mechanisms(
        &self,
        _uri: &str,
        _auth_source: &str,
        _username: &str,
    ) -> Result<Vec<String>> {
        Ok(self.mechanisms.clone())
    }
}

/// Small batches and a poll on every record, so tests see every step
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.transfer.batch_size = 2;
    config.transfer.poll_interval = 1;
    config
}
