//! In-memory [`DocumentStore`] for tests and scratch runs.
//!
//! Collections are `BTreeMap`s behind one `std::sync::RwLock`, so listing
//! returns documents in key order and every write checks its precondition
//! and applies under the same lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{
    apply_write, DocumentStore, Fields, Precondition, StoredDocument, WriteMode, WriteOutcome,
};

struct Entry {
    fields: Fields,
    version: u64,
}

type Collection = BTreeMap<String, Entry>;

pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, entry)| StoredDocument {
                        key: key.clone(),
                        fields: entry.fields.clone(),
                        version: entry.version,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .map(|entry| StoredDocument {
                key: key.to_string(),
                fields: entry.fields.clone(),
                version: entry.version,
            }))
    }

    async fn write(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<WriteOutcome> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(key);

        if !precondition.holds(current.map(|e| e.version)) {
            return Ok(WriteOutcome::Conflict);
        }

        let version = current.map(|e| e.version).unwrap_or(0) + 1;
        let fields = apply_write(current.map(|e| &e.fields), fields, mode);
        docs.insert(key.to_string(), Entry { fields, version });
        Ok(WriteOutcome::Applied)
    }

    async fn delete(
        &self,
        collection: &str,
        key: &str,
        precondition: Precondition,
    ) -> Result<WriteOutcome> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(if precondition.holds(None) {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Conflict
            });
        };

        if !precondition.holds(docs.get(key).map(|e| e.version)) {
            return Ok(WriteOutcome::Conflict);
        }
        docs.remove(key);
        Ok(WriteOutcome::Applied)
    }
}
