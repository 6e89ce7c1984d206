//! Inventory data types and their document-store encoding.
//!
//! An item's name is the document key, never a field. The remaining
//! attributes are stored under the field names the collection has always
//! used (`Quantity`, `EXP`, `MFG`, `Classification`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::StoredDocument;

pub const FIELD_QUANTITY: &str = "Quantity";
pub const FIELD_EXPIRATION: &str = "EXP";
pub const FIELD_MANUFACTURE: &str = "MFG";
pub const FIELD_CLASSIFICATION: &str = "Classification";

/// One pantry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacture_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, quantity: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            expiration_date: None,
            manufacture_date: None,
            classification: None,
        }
    }

    /// Decode a stored document. Unknown fields are ignored.
    pub fn from_document(doc: &StoredDocument) -> Result<Self> {
        let quantity = doc
            .fields
            .get(FIELD_QUANTITY)
            .and_then(Value::as_u64)
            .with_context(|| format!("document '{}' has no valid {}", doc.key, FIELD_QUANTITY))?;

        let text = |field: &str| {
            doc.fields
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            name: doc.key.clone(),
            quantity,
            expiration_date: text(FIELD_EXPIRATION),
            manufacture_date: text(FIELD_MANUFACTURE),
            classification: text(FIELD_CLASSIFICATION),
        })
    }
}

/// Optional attributes supplied alongside an add.
///
/// `None` and empty strings both mean "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub manufacture_date: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
}

impl ItemDetails {
    /// Copy every supplied, non-empty attribute into `fields`.
    pub fn merge_into(&self, fields: &mut Map<String, Value>) {
        let supplied = [
            (FIELD_EXPIRATION, &self.expiration_date),
            (FIELD_MANUFACTURE, &self.manufacture_date),
            (FIELD_CLASSIFICATION, &self.classification),
        ];
        for (field, value) in supplied {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                fields.insert(field.to_string(), Value::String(v.to_string()));
            }
        }
    }
}

/// Case-insensitive substring filter over item names.
///
/// An empty term keeps every item. Order is preserved.
pub fn filter_by_name<'a>(items: &'a [InventoryItem], term: &str) -> Vec<&'a InventoryItem> {
    let needle = term.to_lowercase();
    items
        .iter()
        .filter(|item| item.name.to_lowercase().contains(&needle))
        .collect()
}
