//! Error types for docchat.
//!
//! The library surfaces typed errors; the CLI boundary folds them into
//! `anyhow` for display.

use thiserror::Error;

/// Chunking constraint violations.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("window size {window} must be greater than overlap {overlap}")]
    WindowNotLargerThanOverlap { window: usize, overlap: usize },

    #[error("no pages to chunk")]
    NoPages,

    #[error("pages from multiple sources: expected {expected}, found {found}")]
    MixedSources { expected: String, found: String },
}

/// Embedding provider failures.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding config error: {0}")]
    Config(String),

    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("embedding failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("empty embedding response")]
    EmptyResponse,
}

/// Answer generator failures.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("generation config error: {0}")]
    Config(String),

    #[error("generation API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("generation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("empty generation response")]
    EmptyResponse,
}

/// Vector index failures.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The persistence layer is unreachable or rejected the operation.
    /// Never silently falls back to stale in-memory state.
    #[error("index storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// The query embedder differs from the one a collection was built
    /// with. Searching across spaces would produce nonsense rankings.
    #[error(
        "embedding space mismatch for collection {collection}: \
         indexed with {indexed}, queried with {query}"
    )]
    EmbeddingSpaceMismatch {
        collection: String,
        indexed: String,
        query: String,
    },

    /// A record's embedding length does not match the collection's dims.
    #[error("record {split_id} has embedding length {got}, collection expects {want}")]
    DimensionMismatch {
        split_id: u32,
        got: usize,
        want: usize,
    },

    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Per-document ingestion failures. A failed ingestion leaves the
/// document's prior collection, if any, untouched.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Query-path failures. All of them leave the conversation in `Idle`.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Another question is already in flight on this conversation.
    #[error("a question is already being answered on this conversation")]
    Busy,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerateError),
}

/// Page extraction failures (pipeline layer, not core).
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}
