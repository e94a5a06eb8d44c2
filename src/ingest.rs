//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path: pages → chunking → embedding → atomic
//! collection rebuild → registry upsert. Ingestion is idempotent per
//! document name (the collection id is derived from the filename and
//! the rebuild replaces it wholesale) and isolated per document: a
//! failure anywhere before the rebuild commits leaves the document's
//! prior collection untouched and affects no other document.

use tracing::info;

use crate::chunk::chunk_pages;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::index::VectorIndex;
use crate::models::{IndexRecord, IngestReport, Page};
use crate::registry::DocumentRegistry;

/// The write path's collaborators and tuning, bundled once.
pub struct IngestPipeline<'a> {
    pub index: &'a dyn VectorIndex,
    pub registry: &'a DocumentRegistry,
    pub embedder: &'a dyn Embedder,
    pub window_chars: usize,
    pub overlap_chars: usize,
    pub batch_size: usize,
}

impl IngestPipeline<'_> {
    /// Ingest one document's pages, replacing any prior collection for
    /// the same document name.
    ///
    /// Chunks are embedded in `split_id` order, and every embedding is
    /// computed before the first index write, so an embedding failure
    /// can never leave a partially rebuilt collection behind.
    pub async fn ingest_document(
        &self,
        pages: &[Page],
        storage_handle: &str,
    ) -> Result<IngestReport, IngestError> {
        let chunks = chunk_pages(pages, self.window_chars, self.overlap_chars)?;
        let name = pages[0].source.clone();

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).await?);
        }

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord {
                content: chunk.content.clone(),
                metadata: chunk.metadata(),
                embedding,
            })
            .collect();

        let chunk_count = records.len();
        let collection_id = crate::registry::collection_id_for(&name);
        self.index
            .rebuild_collection(&collection_id, &self.embedder.signature(), records)
            .await?;
        self.registry.upsert(&name, storage_handle).await?;

        info!(
            document = %name,
            collection = %collection_id,
            chunks = chunk_count,
            "ingested document"
        );

        Ok(IngestReport {
            collection_id,
            chunk_count,
        })
    }
}
