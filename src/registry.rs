//! Document registry: filename → collection id + storage handle.
//!
//! A thin lookup table over the same SQLite pool as the index. Its
//! invariants carry the scoping behavior: the collection id is a pure
//! function of the filename (so re-ingestion lands on the same
//! collection), and scope resolution skips unknown filenames while
//! reporting how many were skipped.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::error::IndexError;
use crate::models::DocumentEntry;

/// Derive the index collection id for a document filename.
///
/// Deterministic, so ingesting the same filename twice targets the same
/// collection; hashed, so arbitrary filenames stay table-value safe.
pub fn collection_id_for(filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("m_{}", &digest[..16])
}

/// Outcome of resolving a scope against the registry.
#[derive(Debug, Clone)]
pub struct ScopeResolution {
    /// Filenames that exist in the registry, in scope iteration order.
    pub sources: Vec<String>,
    /// Scope entries that matched no registered document.
    pub unresolved: usize,
}

#[derive(Clone)]
pub struct DocumentRegistry {
    pool: SqlitePool,
}

impl DocumentRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update the entry for `filename`, returning its
    /// collection id. Called exactly once per successful ingestion.
    pub async fn upsert(
        &self,
        filename: &str,
        storage_handle: &str,
    ) -> Result<String, IndexError> {
        let collection_id = collection_id_for(filename);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (filename, collection_id, storage_handle, ingested_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                storage_handle = excluded.storage_handle,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(filename)
        .bind(&collection_id)
        .bind(storage_handle)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(collection_id)
    }

    /// Resolve a scope to the registered filenames it contains.
    ///
    /// Unknown filenames are silently skipped and counted — a missing
    /// document narrows the scope, it does not fail the query.
    pub async fn resolve(&self, scope: &BTreeSet<String>) -> Result<ScopeResolution, IndexError> {
        let mut sources = Vec::with_capacity(scope.len());
        let mut unresolved = 0usize;

        for filename in scope {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT filename FROM documents WHERE filename = ?")
                    .bind(filename)
                    .fetch_optional(&self.pool)
                    .await?;
            match exists {
                Some(name) => sources.push(name),
                None => unresolved += 1,
            }
        }

        Ok(ScopeResolution { sources, unresolved })
    }

    /// All registered documents, ordered by filename.
    pub async fn list(&self) -> Result<Vec<DocumentEntry>, IndexError> {
        let rows = sqlx::query(
            "SELECT filename, collection_id, storage_handle FROM documents ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentEntry {
                filename: row.get("filename"),
                collection_id: row.get("collection_id"),
                storage_handle: row.get("storage_handle"),
            })
            .collect())
    }
}
