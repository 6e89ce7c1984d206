//! SQLite-backed [`DocumentStore`].
//!
//! One row per document in the `documents` table, fields stored as a JSON
//! text column. Conditional writes are single statements guarded by the
//! `version` column, so two processes sharing the file cannot lose each
//! other's updates. Unconditional writes are built on the same
//! compare-and-swap and loop until they land.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{
    apply_write, DocumentStore, Fields, Precondition, StoredDocument, WriteMode, WriteOutcome,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode(key: String, fields_json: &str, version: i64) -> Result<StoredDocument> {
        let fields: Fields = serde_json::from_str(fields_json)
            .with_context(|| format!("corrupt fields for document '{}'", key))?;
        Ok(StoredDocument {
            key,
            fields,
            version: version as u64,
        })
    }

    async fn insert_new(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, key, fields_json, version, updated_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(collection, key) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(serde_json::to_string(fields)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_at_version(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        version: u64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET fields_json = ?, version = version + 1, updated_at = ?
            WHERE collection = ? AND key = ? AND version = ?
            "#,
        )
        .bind(serde_json::to_string(fields)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(collection)
        .bind(key)
        .bind(version as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// One compare-and-swap attempt against the document as it is now.
    async fn try_write(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<WriteOutcome> {
        let current = self.get(collection, key).await?;
        if !precondition.holds(current.as_ref().map(|d| d.version)) {
            return Ok(WriteOutcome::Conflict);
        }

        let applied = match current {
            None => {
                let fields = apply_write(None, fields.clone(), mode);
                self.insert_new(collection, key, &fields).await?
            }
            Some(doc) => {
                let fields = apply_write(Some(&doc.fields), fields.clone(), mode);
                self.update_at_version(collection, key, &fields, doc.version)
                    .await?
            }
        };

        Ok(if applied {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT key, fields_json, version FROM documents WHERE collection = ? ORDER BY key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let fields_json: String = row.get("fields_json");
                Self::decode(row.get("key"), &fields_json, row.get("version"))
            })
            .collect()
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT fields_json, version FROM documents WHERE collection = ? AND key = ?",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let fields_json: String = row.get("fields_json");
                Ok(Some(Self::decode(
                    key.to_string(),
                    &fields_json,
                    row.get("version"),
                )?))
            }
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<WriteOutcome> {
        loop {
            let outcome = self
                .try_write(collection, key, &fields, mode, precondition)
                .await?;
            // A conditional write reports the conflict; an unconditional one
            // only lost a race between its read and its write, so go again.
            if outcome == WriteOutcome::Applied || precondition != Precondition::None {
                return Ok(outcome);
            }
            tracing::debug!(collection, key, "unconditional write raced, retrying");
        }
    }

    async fn delete(
        &self,
        collection: &str,
        key: &str,
        precondition: Precondition,
    ) -> Result<WriteOutcome> {
        let result = match precondition {
            Precondition::None => {
                sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
                    .bind(collection)
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                return Ok(WriteOutcome::Applied);
            }
            Precondition::Missing => {
                let exists = self.get(collection, key).await?.is_some();
                return Ok(if exists {
                    WriteOutcome::Conflict
                } else {
                    WriteOutcome::Applied
                });
            }
            Precondition::Version(version) => {
                sqlx::query(
                    "DELETE FROM documents WHERE collection = ? AND key = ? AND version = ?",
                )
                .bind(collection)
                .bind(key)
                .bind(version as i64)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(if result.rows_affected() == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }
}
