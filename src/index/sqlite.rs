//! SQLite-backed [`VectorIndex`].
//!
//! One row per record, one logical collection per ingested document.
//! A rebuild runs in a single transaction (delete + bulk insert +
//! signature upsert), so concurrent readers observe either the old or
//! the new collection. The database file is the persisted form of the
//! index: reopening it yields the same records regardless of the order
//! they were inserted in.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, EmbedderSignature};
use crate::error::IndexError;
use crate::models::{ChunkMetadata, IndexRecord, ScoredRecord};

use super::{check_dims, rank_candidates, RecordFilter, VectorIndex};

/// Vector index persisted in SQLite via sqlx.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn in_placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn rebuild_collection(
        &self,
        collection_id: &str,
        signature: &EmbedderSignature,
        records: Vec<IndexRecord>,
    ) -> Result<(), IndexError> {
        check_dims(signature, &records)?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // The collection row first: records carry a foreign key to it.
        sqlx::query(
            r#"
            INSERT INTO collections (id, embedder_model, embedder_dims, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                embedder_model = excluded.embedder_model,
                embedder_dims = excluded.embedder_dims,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection_id)
        .bind(&signature.model)
        .bind(signature.dims as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM records WHERE collection_id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await?;

        for record in &records {
            let page_indices = serde_json::to_string(&record.metadata.page_indices)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection_id, split_id, source, content, page_indices, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection_id)
            .bind(record.metadata.split_id as i64)
            .bind(&record.metadata.source)
            .bind(&record.content)
            .bind(&page_indices)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        signature: &EmbedderSignature,
        filter: &RecordFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        // Verify the embedding space of every collection the filter lets
        // through before ranking anything. Empty collections contribute
        // no candidates and are not checked.
        let sig_rows = match filter.source_list() {
            Some(list) if list.is_empty() => Vec::new(),
            Some(list) => {
                let sql = format!(
                    "SELECT DISTINCT c.id, c.embedder_model, c.embedder_dims \
                     FROM collections c JOIN records r ON r.collection_id = c.id \
                     WHERE r.source IN ({})",
                    in_placeholders(list.len())
                );
                let mut q = sqlx::query(&sql);
                for source in &list {
                    q = q.bind(*source);
                }
                q.fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query(
                    "SELECT c.id, c.embedder_model, c.embedder_dims FROM collections c \
                     WHERE EXISTS (SELECT 1 FROM records r WHERE r.collection_id = c.id)",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        for row in &sig_rows {
            let model: String = row.get("embedder_model");
            let dims: i64 = row.get("embedder_dims");
            if model != signature.model || dims as usize != signature.dims {
                let indexed = EmbedderSignature {
                    model,
                    dims: dims as usize,
                };
                return Err(IndexError::EmbeddingSpaceMismatch {
                    collection: row.get("id"),
                    indexed: indexed.to_string(),
                    query: signature.to_string(),
                });
            }
        }

        let rows = match filter.source_list() {
            Some(list) if list.is_empty() => Vec::new(),
            Some(list) => {
                let sql = format!(
                    "SELECT split_id, source, content, page_indices, embedding \
                     FROM records WHERE source IN ({})",
                    in_placeholders(list.len())
                );
                let mut q = sqlx::query(&sql);
                for source in &list {
                    q = q.bind(*source);
                }
                q.fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query("SELECT split_id, source, content, page_indices, embedding FROM records")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let split_id: i64 = row.get("split_id");
            let page_indices: String = row.get("page_indices");
            let blob: Vec<u8> = row.get("embedding");
            candidates.push(IndexRecord {
                content: row.get("content"),
                metadata: ChunkMetadata {
                    source: row.get("source"),
                    split_id: split_id as u32,
                    page_indices: serde_json::from_str(&page_indices)?,
                },
                embedding: blob_to_vec(&blob),
            });
        }

        Ok(rank_candidates(query, candidates, k))
    }

    async fn record_count(&self, collection_id: &str) -> Result<usize, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection_id = ?")
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
