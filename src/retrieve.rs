//! Scoped retrieval over the vector index.
//!
//! Resolves a document scope through the registry, embeds the question
//! with the same embedder used at ingestion, and returns the nearest
//! chunks. Scope entries that match no ingested document are skipped
//! and counted, never fatal.

use std::collections::BTreeSet;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::QueryError;
use crate::index::{RecordFilter, VectorIndex};
use crate::models::ScoredRecord;
use crate::registry::DocumentRegistry;

/// Result of one retrieval: matched chunks plus how many scope entries
/// failed to resolve.
#[derive(Debug)]
pub struct Retrieval {
    pub chunks: Vec<ScoredRecord>,
    pub unresolved_scope: usize,
}

pub struct Retriever<'a> {
    pub index: &'a dyn VectorIndex,
    pub registry: &'a DocumentRegistry,
    pub embedder: &'a dyn Embedder,
    pub top_k: usize,
}

impl Retriever<'_> {
    /// Return the `top_k` chunks most similar to `question` within `scope`.
    ///
    /// An empty scope searches the whole index — that is a deliberate
    /// choice, not a fallthrough: "no documents selected" means "all
    /// documents". A non-empty scope whose every entry is unknown
    /// searches nothing and returns zero chunks.
    pub async fn retrieve(
        &self,
        question: &str,
        scope: &BTreeSet<String>,
    ) -> Result<Retrieval, QueryError> {
        let (filter, unresolved) = if scope.is_empty() {
            (RecordFilter::all(), 0)
        } else {
            let resolution = self.registry.resolve(scope).await?;
            (
                RecordFilter::sources(resolution.sources),
                resolution.unresolved,
            )
        };

        let query_vec = self.embedder.embed_query(question).await?;
        let chunks = self
            .index
            .search(&query_vec, &self.embedder.signature(), &filter, self.top_k)
            .await?;

        debug!(
            matched = chunks.len(),
            unresolved_scope = unresolved,
            "retrieval complete"
        );

        Ok(Retrieval {
            chunks,
            unresolved_scope: unresolved,
        })
    }
}
