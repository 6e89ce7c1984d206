//! Inventory operations over a [`DocumentStore`] collection.
//!
//! Three operations make up the whole inventory surface:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`list_all`](Inventory::list_all) | every item in the collection |
//! | [`upsert_increment`](Inventory::upsert_increment) | create, or add to the quantity and merge details |
//! | [`decrement_or_delete`](Inventory::decrement_or_delete) | take one away, deleting at the last one |
//!
//! Each mutation reads the current document and writes back conditioned on
//! the version it read. When another writer got there first the cycle is
//! repeated, up to `max_conflict_retries` extra attempts.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::Config;
use crate::models::{InventoryItem, ItemDetails, FIELD_QUANTITY};
use crate::store::{DocumentStore, Precondition, WriteMode, WriteOutcome};

/// Inventory failures callers need to tell apart from plain I/O errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("amount must be at least 1, got {0}")]
    InvalidAmount(u64),
    #[error("'{name}' kept changing underneath us; gave up after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },
    #[error("adding {amount} to '{name}' would overflow its quantity of {quantity}")]
    QuantityOverflow {
        name: String,
        quantity: u64,
        amount: u64,
    },
}

#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn DocumentStore>,
    collection: String,
    max_conflict_retries: u32,
}

impl Inventory {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            max_conflict_retries: 5,
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self::new(store, config.store.collection.clone())
            .with_max_conflict_retries(config.inventory.max_conflict_retries)
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Every item in the collection, in backend order.
    pub async fn list_all(&self) -> Result<Vec<InventoryItem>> {
        self.store
            .list(&self.collection)
            .await?
            .iter()
            .map(InventoryItem::from_document)
            .collect()
    }

    /// Add `amount` to `name`, creating the item when absent.
    ///
    /// Supplied details overwrite the stored ones; absent or empty details
    /// leave the stored values alone.
    pub async fn upsert_increment(
        &self,
        name: &str,
        amount: u64,
        details: &ItemDetails,
    ) -> Result<()> {
        if amount == 0 {
            return Err(InventoryError::InvalidAmount(amount).into());
        }

        for _ in 0..self.attempts() {
            let current = self.store.get(&self.collection, name).await?;
            let (quantity, precondition) = match &current {
                Some(doc) => {
                    let existing = InventoryItem::from_document(doc)?.quantity;
                    let total = existing.checked_add(amount).ok_or_else(|| {
                        InventoryError::QuantityOverflow {
                            name: name.to_string(),
                            quantity: existing,
                            amount,
                        }
                    })?;
                    (total, Precondition::Version(doc.version))
                }
                None => (amount, Precondition::Missing),
            };

            let mut fields = Map::new();
            fields.insert(FIELD_QUANTITY.to_string(), json!(quantity));
            details.merge_into(&mut fields);

            let outcome = self
                .store
                .write(&self.collection, name, fields, WriteMode::Merge, precondition)
                .await?;
            if outcome == WriteOutcome::Applied {
                tracing::debug!(name, quantity, "item incremented");
                return Ok(());
            }
            tracing::debug!(name, "increment lost a race, re-reading");
        }

        Err(self.conflict(name))
    }

    /// Take one away from `name`. The last one deletes the item; an absent
    /// item is left alone.
    ///
    /// The remaining quantity is written as a replace, so stored dates and
    /// classification do not survive a decrement.
    pub async fn decrement_or_delete(&self, name: &str) -> Result<()> {
        for _ in 0..self.attempts() {
            let Some(doc) = self.store.get(&self.collection, name).await? else {
                return Ok(());
            };
            let quantity = InventoryItem::from_document(&doc)?.quantity;
            let precondition = Precondition::Version(doc.version);

            let outcome = if quantity <= 1 {
                self.store
                    .delete(&self.collection, name, precondition)
                    .await?
            } else {
                let mut fields = Map::new();
                fields.insert(FIELD_QUANTITY.to_string(), Value::from(quantity - 1));
                self.store
                    .write(&self.collection, name, fields, WriteMode::Replace, precondition)
                    .await?
            };

            if outcome == WriteOutcome::Applied {
                tracing::debug!(name, remaining = quantity.saturating_sub(1), "item decremented");
                return Ok(());
            }
            tracing::debug!(name, "decrement lost a race, re-reading");
        }

        Err(self.conflict(name))
    }

    fn attempts(&self) -> u32 {
        self.max_conflict_retries + 1
    }

    fn conflict(&self, name: &str) -> anyhow::Error {
        InventoryError::Conflict {
            name: name.to_string(),
            attempts: self.attempts(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::{Fields, StoredDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn inventory() -> Inventory {
        Inventory::new(Arc::new(InMemoryStore::new()), "Inventory")
    }

    async fn find(inv: &Inventory, name: &str) -> Option<InventoryItem> {
        inv.list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|i| i.name == name)
    }

    #[tokio::test]
    async fn test_increments_sum() {
        let inv = inventory();
        for n in [1, 4, 2, 7] {
            inv.upsert_increment("Rice", n, &ItemDetails::default())
                .await
                .unwrap();
        }
        assert_eq!(find(&inv, "Rice").await.unwrap().quantity, 14);
    }

    #[tokio::test]
    async fn test_eggs_scenario() {
        let inv = inventory();
        inv.upsert_increment("Eggs", 12, &ItemDetails::default())
            .await
            .unwrap();
        assert_eq!(find(&inv, "Eggs").await, Some(InventoryItem::new("Eggs", 12)));

        inv.decrement_or_delete("Eggs").await.unwrap();
        assert_eq!(find(&inv, "Eggs").await.unwrap().quantity, 11);

        for _ in 0..11 {
            inv.decrement_or_delete("Eggs").await.unwrap();
        }
        assert!(find(&inv, "Eggs").await.is_none());
    }

    #[tokio::test]
    async fn test_bread_scenario_merges_details() {
        let inv = inventory();
        let dated = ItemDetails {
            expiration_date: Some("2025-01-01".into()),
            ..Default::default()
        };
        inv.upsert_increment("Bread", 1, &dated).await.unwrap();
        inv.upsert_increment("Bread", 2, &ItemDetails::default())
            .await
            .unwrap();

        let bread = find(&inv, "Bread").await.unwrap();
        assert_eq!(bread.quantity, 3);
        assert_eq!(bread.expiration_date.as_deref(), Some("2025-01-01"));
    }

    #[tokio::test]
    async fn test_supplied_details_overwrite() {
        let inv = inventory();
        let first = ItemDetails {
            classification: Some("dairy".into()),
            ..Default::default()
        };
        let second = ItemDetails {
            classification: Some("cheese".into()),
            manufacture_date: Some("2024-02-02".into()),
            ..Default::default()
        };
        inv.upsert_increment("Brie", 1, &first).await.unwrap();
        inv.upsert_increment("Brie", 1, &second).await.unwrap();

        let brie = find(&inv, "Brie").await.unwrap();
        assert_eq!(brie.classification.as_deref(), Some("cheese"));
        assert_eq!(brie.manufacture_date.as_deref(), Some("2024-02-02"));
    }

    #[tokio::test]
    async fn test_decrement_last_one_deletes() {
        let inv = inventory();
        inv.upsert_increment("Milk", 1, &ItemDetails::default())
            .await
            .unwrap();
        inv.decrement_or_delete("Milk").await.unwrap();
        assert!(inv.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decrement_absent_is_noop() {
        let inv = inventory();
        inv.upsert_increment("Salt", 2, &ItemDetails::default())
            .await
            .unwrap();
        let before = inv.list_all().await.unwrap();
        inv.decrement_or_delete("Pepper").await.unwrap();
        assert_eq!(inv.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_decrement_drops_details() {
        let inv = inventory();
        let dated = ItemDetails {
            expiration_date: Some("2025-06-01".into()),
            ..Default::default()
        };
        inv.upsert_increment("Yogurt", 3, &dated).await.unwrap();
        inv.decrement_or_delete("Yogurt").await.unwrap();
        assert_eq!(find(&inv, "Yogurt").await, Some(InventoryItem::new("Yogurt", 2)));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let inv = inventory();
        let err = inv
            .upsert_increment("Air", 0, &ItemDetails::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<InventoryError>(),
            Some(&InventoryError::InvalidAmount(0))
        );
        assert!(inv.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_increment_is_rejected() {
        let inv = inventory();
        inv.upsert_increment("Rice", u64::MAX, &ItemDetails::default())
            .await
            .unwrap();

        let err = inv
            .upsert_increment("Rice", 1, &ItemDetails::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<InventoryError>(),
            Some(&InventoryError::QuantityOverflow {
                name: "Rice".into(),
                quantity: u64::MAX,
                amount: 1,
            })
        );
        assert_eq!(find(&inv, "Rice").await.unwrap().quantity, u64::MAX);
    }

    #[tokio::test]
    async fn test_empty_name_is_a_key() {
        let inv = inventory();
        inv.upsert_increment("", 1, &ItemDetails::default())
            .await
            .unwrap();
        assert_eq!(find(&inv, "").await.unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let inv = inventory().with_max_conflict_retries(1_000);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let inv = inv.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    inv.upsert_increment("Beans", 1, &ItemDetails::default())
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(find(&inv, "Beans").await.unwrap().quantity, 160);
    }

    /// A store whose conditional writes always lose.
    struct AlwaysConflicts {
        inner: InMemoryStore,
        writes: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for AlwaysConflicts {
        async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
            self.inner.list(collection).await
        }

        async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
            self.inner.get(collection, key).await
        }

        async fn write(
            &self,
            _collection: &str,
            _key: &str,
            _fields: Fields,
            _mode: WriteMode,
            _precondition: Precondition,
        ) -> Result<WriteOutcome> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(WriteOutcome::Conflict)
        }

        async fn delete(
            &self,
            _collection: &str,
            _key: &str,
            _precondition: Precondition,
        ) -> Result<WriteOutcome> {
            Ok(WriteOutcome::Conflict)
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let store = Arc::new(AlwaysConflicts {
            inner: InMemoryStore::new(),
            writes: AtomicU32::new(0),
        });
        let inv = Inventory::new(store.clone(), "Inventory").with_max_conflict_retries(2);

        let err = inv
            .upsert_increment("Tea", 1, &ItemDetails::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<InventoryError>(),
            Some(&InventoryError::Conflict {
                name: "Tea".into(),
                attempts: 3
            })
        );
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    }
}
