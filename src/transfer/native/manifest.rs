//! The native archive's self-description

use serde::{Deserialize, Serialize};

use crate::transfer::job::Namespace;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    /// RFC 3339 timestamp of the export start
    pub exported_at: String,
    pub databases: Vec<ManifestDatabase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDatabase {
    pub name: String,
    pub collections: Vec<ManifestCollection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCollection {
    pub name: String,
    pub record_count: u64,
    pub index_count: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            databases: Vec::new(),
        }
    }

    /// Add a completed collection
    pub fn record(&mut self, namespace: &Namespace, record_count: u64, index_count: u64) {
        let collection = ManifestCollection {
            name: namespace.collection.clone(),
            record_count,
            index_count,
        };
        match self
            .databases
            .iter_mut()
            .find(|db| db.name == namespace.database)
        {
            Some(db) => db.collections.push(collection),
            None => self.databases.push(ManifestDatabase {
                name: namespace.database.clone(),
                collections: vec![collection],
            }),
        }
    }

    pub fn total_records(&self) -> u64 {
        self.databases
            .iter()
            .flat_map(|db| &db.collections)
            .map(|c| c.record_count)
            .sum()
    }

    /// Every collection with its record count, in manifest order
    pub fn namespaces(&self) -> Vec<(Namespace, u64)> {
        self.databases
            .iter()
            .flat_map(|db| {
                db.collections
                    .iter()
                    .map(move |c| (Namespace::new(&db.name, &c.name), c.record_count))
            })
            .collect()
    }

    pub fn collection(&self, namespace: &Namespace) -> Option<&ManifestCollection> {
        self.databases
            .iter()
            .find(|db| db.name == namespace.database)?
            .collections
            .iter()
            .find(|c| c.name == namespace.collection)
    }
}
