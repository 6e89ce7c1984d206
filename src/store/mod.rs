//! Document store abstraction.
//!
//! The [`DocumentStore`] trait models a schemaless, keyed document
//! collection: every document is a JSON object addressed by
//! `(collection, key)`. Writes either overlay the supplied fields
//! ([`WriteMode::Merge`]) or replace the whole document
//! ([`WriteMode::Replace`]).
//!
//! Each document carries a version that starts at 1 and grows by one on
//! every write. Writes and deletes accept a [`Precondition`] so callers can
//! run read-modify-write cycles as compare-and-swap instead of racing.
//!
//! # Backends
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | In-memory | [`memory`] | `RwLock<BTreeMap>`, for tests and scratch runs |
//! | SQLite | [`sqlite`] | one row per document, JSON-encoded fields |

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::Config;

/// JSON object holding a document's fields.
pub type Fields = Map<String, Value>;

/// A document as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub fields: Fields,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overlay the supplied fields, keeping every other stored field.
    Merge,
    /// Drop whatever was stored and keep only the supplied fields.
    Replace,
}

/// Condition the stored document must satisfy for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional.
    None,
    /// The document must not exist.
    Missing,
    /// The document must exist at exactly this version.
    Version(u64),
}

impl Precondition {
    /// Check the precondition against the currently stored version.
    pub fn holds(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (Precondition::None, _) => true,
            (Precondition::Missing, None) => true,
            (Precondition::Version(expected), Some(actual)) => *expected == actual,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The precondition did not hold; nothing was written.
    Conflict,
}

/// Abstract keyed document collection.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list`](DocumentStore::list) | Every document in a collection |
/// | [`get`](DocumentStore::get) | One document by key |
/// | [`write`](DocumentStore::write) | Merge or replace a document |
/// | [`delete`](DocumentStore::delete) | Remove a document |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every document in `collection`. No pagination.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>>;

    /// Write `fields` to `key`, creating the document when absent.
    async fn write(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<WriteOutcome>;

    /// Remove `key`. Deleting an absent document unconditionally is `Applied`.
    async fn delete(
        &self,
        collection: &str,
        key: &str,
        precondition: Precondition,
    ) -> Result<WriteOutcome>;
}

/// Build the backend named by `[store].backend`.
pub async fn open(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    if config.store.is_memory() {
        return Ok(Arc::new(memory::InMemoryStore::new()));
    }
    let pool = crate::db::connect(&config.store.path).await?;
    crate::migrate::ensure_schema(&pool).await?;
    Ok(Arc::new(sqlite::SqliteStore::new(pool)))
}

/// Apply a write to an in-hand document, returning the new field set.
///
/// Shared by the backends so merge and replace behave identically.
pub(crate) fn apply_write(existing: Option<&Fields>, fields: Fields, mode: WriteMode) -> Fields {
    match (mode, existing) {
        (WriteMode::Merge, Some(current)) => {
            let mut merged = current.clone();
            merged.extend(fields);
            merged
        }
        _ => fields,
    }
}
