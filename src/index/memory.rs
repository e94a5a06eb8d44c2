//! In-memory [`VectorIndex`] implementation for tests.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`; a rebuild
//! swaps the whole entry under the write lock, so readers see either the
//! old or the new record set, never a mix. Search is brute-force cosine
//! similarity, same as the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::EmbedderSignature;
use crate::error::IndexError;
use crate::models::{IndexRecord, ScoredRecord};

use super::{check_dims, rank_candidates, RecordFilter, VectorIndex};

struct StoredCollection {
    signature: EmbedderSignature,
    records: Vec<IndexRecord>,
}

/// In-memory index for tests and embedding-free dry runs.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn rebuild_collection(
        &self,
        collection_id: &str,
        signature: &EmbedderSignature,
        records: Vec<IndexRecord>,
    ) -> Result<(), IndexError> {
        check_dims(signature, &records)?;
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.insert(
            collection_id.to_string(),
            StoredCollection {
                signature: signature.clone(),
                records,
            },
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        signature: &EmbedderSignature,
        filter: &RecordFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());

        let mut candidates = Vec::new();
        for (collection_id, stored) in collections.iter() {
            let in_scope = stored
                .records
                .iter()
                .any(|r| filter.matches(&r.metadata));
            if !in_scope {
                continue;
            }
            if stored.signature != *signature {
                return Err(IndexError::EmbeddingSpaceMismatch {
                    collection: collection_id.clone(),
                    indexed: stored.signature.to_string(),
                    query: signature.to_string(),
                });
            }
            candidates.extend(
                stored
                    .records
                    .iter()
                    .filter(|r| filter.matches(&r.metadata))
                    .cloned(),
            );
        }

        Ok(rank_candidates(query, candidates, k))
    }

    async fn record_count(&self, collection_id: &str) -> Result<usize, IndexError> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection_id)
            .map(|c| c.records.len())
            .unwrap_or(0))
    }
}
