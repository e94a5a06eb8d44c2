//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the collection lifecycle used by
//! the ingestion and retrieval pipeline, with two backends:
//! [`SqliteIndex`](sqlite::SqliteIndex) for persistence and
//! [`MemoryIndex`](memory::MemoryIndex) for tests.
//!
//! A collection holds every record of one ingested document and is
//! replaced wholesale on re-ingestion — rebuild, don't append — so a
//! re-uploaded document can never leave duplicate or stale records
//! behind. Rebuilds are atomic from a reader's perspective: a concurrent
//! search observes either the fully old or the fully new collection.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, EmbedderSignature};
use crate::error::IndexError;
use crate::models::{ChunkMetadata, IndexRecord, ScoredRecord};

/// Restricts the searchable set before ranking.
///
/// The only metadata predicate retrieval needs is membership of
/// `metadata.source` in a resolved scope; `RecordFilter::all()` is the
/// explicit "search the whole index" choice used for an empty scope.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    sources: Option<BTreeSet<String>>,
}

impl RecordFilter {
    /// No restriction: every record is a candidate.
    pub fn all() -> Self {
        Self { sources: None }
    }

    /// Restrict candidates to records whose `metadata.source` is in `sources`.
    pub fn sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            sources: Some(sources.into_iter().collect()),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match &self.sources {
            None => true,
            Some(set) => set.contains(&metadata.source),
        }
    }

    pub fn source_list(&self) -> Option<Vec<&str>> {
        self.sources
            .as_ref()
            .map(|set| set.iter().map(String::as_str).collect())
    }
}

/// Storage backend for embedded chunks, keyed by collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Atomically replace all records under `collection_id`.
    ///
    /// No reader ever observes a partially replaced collection. Zero
    /// records yields a valid empty collection. Every record's embedding
    /// length must equal `signature.dims` or the rebuild is rejected
    /// before any write.
    async fn rebuild_collection(
        &self,
        collection_id: &str,
        signature: &EmbedderSignature,
        records: Vec<IndexRecord>,
    ) -> Result<(), IndexError>;

    /// Return the `k` records nearest to `query`, restricted to records
    /// satisfying `filter` before ranking.
    ///
    /// Returns fewer than `k` when the filtered set is smaller, and an
    /// empty result (not an error) on an empty index. Fails with
    /// [`IndexError::EmbeddingSpaceMismatch`] when `signature` differs
    /// from the signature any searched collection was built with.
    async fn search(
        &self,
        query: &[f32],
        signature: &EmbedderSignature,
        filter: &RecordFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError>;

    /// Number of records currently stored under `collection_id`.
    async fn record_count(&self, collection_id: &str) -> Result<usize, IndexError>;
}

/// Score, order, and truncate candidates.
///
/// Higher similarity ranks first; ties break by ascending `split_id`,
/// then ascending `source`, so results are deterministic.
pub(crate) fn rank_candidates(
    query: &[f32],
    candidates: Vec<IndexRecord>,
    k: usize,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(query, &record.embedding);
            ScoredRecord { record, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.metadata.split_id.cmp(&b.record.metadata.split_id))
            .then_with(|| a.record.metadata.source.cmp(&b.record.metadata.source))
    });
    scored.truncate(k);
    scored
}

pub(crate) fn check_dims(
    signature: &EmbedderSignature,
    records: &[IndexRecord],
) -> Result<(), IndexError> {
    for record in records {
        if record.embedding.len() != signature.dims {
            return Err(IndexError::DimensionMismatch {
                split_id: record.metadata.split_id,
                got: record.embedding.len(),
                want: signature.dims,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, split_id: u32, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            content: format!("{source}#{split_id}"),
            metadata: ChunkMetadata {
                source: source.to_string(),
                split_id,
                page_indices: vec![1],
            },
            embedding,
        }
    }

    #[test]
    fn ranking_is_deterministic_on_ties() {
        // Identical vectors => identical scores; order falls back to
        // split_id then source.
        let candidates = vec![
            record("b.pdf", 0, vec![1.0, 0.0]),
            record("a.pdf", 0, vec![1.0, 0.0]),
            record("a.pdf", 1, vec![1.0, 0.0]),
        ];
        let ranked = rank_candidates(&[1.0, 0.0], candidates, 10);
        let order: Vec<(u32, &str)> = ranked
            .iter()
            .map(|s| (s.record.metadata.split_id, s.record.metadata.source.as_str()))
            .collect();
        assert_eq!(order, vec![(0, "a.pdf"), (0, "b.pdf"), (1, "a.pdf")]);
    }

    #[test]
    fn ranking_truncates_to_k() {
        let candidates = vec![
            record("a.pdf", 0, vec![1.0, 0.0]),
            record("a.pdf", 1, vec![0.9, 0.1]),
            record("a.pdf", 2, vec![0.0, 1.0]),
        ];
        let ranked = rank_candidates(&[1.0, 0.0], candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.metadata.split_id, 0);
    }

    #[test]
    fn filter_scopes_by_source() {
        let filter = RecordFilter::sources(["a.pdf".to_string()]);
        assert!(filter.matches(&record("a.pdf", 0, vec![]).metadata));
        assert!(!filter.matches(&record("b.pdf", 0, vec![]).metadata));
        assert!(RecordFilter::all().matches(&record("b.pdf", 0, vec![]).metadata));
    }

    #[test]
    fn dims_check_rejects_ragged_records() {
        let sig = EmbedderSignature {
            model: "test".into(),
            dims: 2,
        };
        let records = vec![record("a.pdf", 0, vec![1.0, 0.0]), record("a.pdf", 1, vec![1.0])];
        assert!(matches!(
            check_dims(&sig, &records),
            Err(IndexError::DimensionMismatch { split_id: 1, .. })
        ));
    }
}
