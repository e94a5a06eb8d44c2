use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Document registry: filename -> collection + storage handle
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            filename TEXT PRIMARY KEY,
            collection_id TEXT NOT NULL UNIQUE,
            storage_handle TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per collection, carrying the embedder signature the
    // collection was built with
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            embedder_model TEXT NOT NULL,
            embedder_dims INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per embedded chunk
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection_id TEXT NOT NULL,
            split_id INTEGER NOT NULL,
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            page_indices TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection_id, split_id),
            FOREIGN KEY (collection_id) REFERENCES collections(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection_id)")
        .execute(pool)
        .await?;

    Ok(())
}
