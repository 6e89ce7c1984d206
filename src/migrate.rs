use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the document table. Idempotent.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            fields_json TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    if config.store.is_memory() {
        tracing::info!("memory backend configured, nothing to migrate");
        return Ok(());
    }

    let pool = db::connect(&config.store.path).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}
