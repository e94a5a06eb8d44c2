//! Core data models used throughout docchat.
//!
//! These types represent the pages, chunks, and index records that flow
//! through the ingestion and retrieval pipeline, plus the registry and
//! conversation types built on top of them.

use serde::{Deserialize, Serialize};

/// One page of extracted text, as produced by the page extractor.
///
/// Immutable once extracted; owned by the ingestion pipeline for the
/// duration of one document's processing and discarded after chunking.
#[derive(Debug, Clone)]
pub struct Page {
    /// Document filename this page belongs to.
    pub source: String,
    /// 1-based page number.
    pub page_number: u32,
    /// Total pages in the source document.
    pub total_pages: u32,
    /// Extracted text. Empty when extraction failed for this page.
    pub text: String,
}

/// A contiguous overlapping window of concatenated page text — the unit
/// of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Document filename.
    pub source: String,
    /// Window index within the document, contiguous from 0.
    pub split_id: u32,
    /// Window text.
    pub content: String,
    /// Start offset into the concatenated page buffer (inclusive).
    pub char_start: usize,
    /// End offset into the concatenated page buffer (exclusive).
    pub char_end: usize,
    /// Ascending page numbers this window overlaps.
    pub page_indices: Vec<u32>,
}

/// The persisted per-record metadata, serialized as JSON with exactly
/// these field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub split_id: u32,
    pub page_indices: Vec<u32>,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            split_id: self.split_id,
            page_indices: self.page_indices.clone(),
        }
    }
}

/// One record in a vector index collection: chunk text, metadata, and
/// its embedding. Embedding length is constant across a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A record matched by a vector search, with its similarity score.
///
/// Higher score means more similar. Equal scores order by ascending
/// `split_id`, then ascending `source`.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: IndexRecord,
    pub score: f32,
}

/// Registry entry mapping a document filename to its index collection
/// and storage handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Unique key.
    pub filename: String,
    /// Derived deterministically from the filename.
    pub collection_id: String,
    /// Opaque handle to where the source file lives (blob storage is an
    /// external collaborator; only the handle is recorded).
    pub storage_handle: String,
}

/// One question/answer exchange in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    /// Filenames cited by the answer, first-seen order, deduplicated.
    pub source_documents: Vec<String>,
}

/// Result of answering one question.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// Cited filenames in first-seen retrieval order.
    pub cited_sources: Vec<String>,
    /// Scope filenames that did not resolve to an ingested document.
    pub unresolved_scope: usize,
}

/// Summary returned by a successful document ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub collection_id: String,
    pub chunk_count: usize,
}
