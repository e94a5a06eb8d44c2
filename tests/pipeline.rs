//! End-to-end pipeline tests over the SQLite index.
//!
//! Driven through the library with a deterministic embedder and a
//! scripted generator; the network-backed providers are exercised only
//! in production. Covers ingestion, re-ingestion, scoped retrieval,
//! persistence round-trip, rebuild atomicity, and the chat flow.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sqlx::SqlitePool;

use docchat::chat::{ChatEngine, Conversation};
use docchat::embedding::{Embedder, EmbedderSignature};
use docchat::error::{EmbedError, GenerateError, IndexError, IngestError};
use docchat::generate::{AnswerGenerator, GenerationRequest};
use docchat::index::sqlite::SqliteIndex;
use docchat::index::{RecordFilter, VectorIndex};
use docchat::ingest::IngestPipeline;
use docchat::models::{ChunkMetadata, IndexRecord, Page};
use docchat::registry::{collection_id_for, DocumentRegistry};
use docchat::retrieve::Retriever;
use docchat::{db, migrate};

/// Deterministic embedder: normalized counts of a few characters.
struct TestEmbedder;

fn test_vec(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let count = |needle: char| lower.chars().filter(|c| *c == needle).count() as f32;
    let v = vec![count('a') + 1.0, count('e'), count('o'), count('s')];
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
}

#[async_trait]
impl Embedder for TestEmbedder {
    fn model_name(&self) -> &str {
        "test-embedder"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| test_vec(t)).collect())
    }
}

/// Embedder that always fails, for ingestion-isolation tests.
struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "test-embedder"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::EmptyResponse)
    }
}

struct EchoGenerator;

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo-generator"
    }
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerateError> {
        Ok(format!("echo: {}", request.question))
    }
}

async fn open(path: &Path) -> SqlitePool {
    let pool = db::connect(path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

fn pages(source: &str, texts: &[&str]) -> Vec<Page> {
    let total = texts.len() as u32;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Page {
            source: source.to_string(),
            page_number: i as u32 + 1,
            total_pages: total,
            text: text.to_string(),
        })
        .collect()
}

async fn ingest(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    doc_pages: &[Page],
) -> Result<docchat::models::IngestReport, IngestError> {
    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let pipeline = IngestPipeline {
        index: &index,
        registry: &registry,
        embedder,
        window_chars: 40,
        overlap_chars: 10,
        batch_size: 8,
    };
    pipeline.ingest_document(doc_pages, "/files/test").await
}

#[tokio::test]
async fn ingest_and_scoped_ask() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    ingest(
        &pool,
        &embedder,
        &pages("oceans.pdf", &["seas and oceans everywhere", "so salty"]),
    )
    .await
    .unwrap();
    ingest(
        &pool,
        &embedder,
        &pages("deserts.pdf", &["dry sand dunes", "hot and arid"]),
    )
    .await
    .unwrap();

    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let engine = ChatEngine {
        retriever: Retriever {
            index: &index,
            registry: &registry,
            embedder: &embedder,
            top_k: 2,
        },
        generator: &EchoGenerator,
        max_context_chars: 10_000,
    };

    let conversation = Conversation::new();
    let scope: BTreeSet<String> = ["oceans.pdf".to_string()].into();
    let answer = engine
        .ask(&conversation, "tell me about the oceans", &scope)
        .await
        .unwrap();

    assert_eq!(answer.cited_sources, vec!["oceans.pdf".to_string()]);
    assert_eq!(answer.unresolved_scope, 0);
    assert_eq!(conversation.turns().len(), 1);
    pool.close().await;
}

#[tokio::test]
async fn scoped_search_never_leaks_other_sources() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    ingest(&pool, &embedder, &pages("a.pdf", &["alpha text one"]))
        .await
        .unwrap();
    ingest(&pool, &embedder, &pages("b.pdf", &["alpha text one"]))
        .await
        .unwrap();

    let index = SqliteIndex::new(pool.clone());
    let filter = RecordFilter::sources(["a.pdf".to_string()]);
    let hits = index
        .search(&test_vec("alpha"), &embedder.signature(), &filter, 10)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.record.metadata.source, "a.pdf");
    }
    pool.close().await;
}

#[tokio::test]
async fn reingest_replaces_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    let doc = pages("b.pdf", &["some repeated content here", "and a second page"]);

    let first = ingest(&pool, &embedder, &doc).await.unwrap();
    let second = ingest(&pool, &embedder, &doc).await.unwrap();
    assert_eq!(first.collection_id, second.collection_id);
    assert_eq!(first.chunk_count, second.chunk_count);

    let index = SqliteIndex::new(pool.clone());
    assert_eq!(
        index.record_count(&first.collection_id).await.unwrap(),
        first.chunk_count
    );

    // No duplicate split ids within the collection.
    let hits = index
        .search(
            &test_vec("content"),
            &embedder.signature(),
            &RecordFilter::sources(["b.pdf".to_string()]),
            100,
        )
        .await
        .unwrap();
    let mut split_ids: Vec<u32> = hits.iter().map(|h| h.record.metadata.split_id).collect();
    let before = split_ids.len();
    split_ids.sort_unstable();
    split_ids.dedup();
    assert_eq!(split_ids.len(), before);
    pool.close().await;
}

#[tokio::test]
async fn failed_embedding_leaves_prior_collection_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let doc = pages("c.pdf", &["original content stays put"]);
    let report = ingest(&pool, &TestEmbedder, &doc).await.unwrap();
    assert!(report.chunk_count > 0);

    let err = ingest(&pool, &BrokenEmbedder, &doc).await.unwrap_err();
    assert!(matches!(err, IngestError::Embedding(_)));

    let index = SqliteIndex::new(pool.clone());
    assert_eq!(
        index.record_count(&report.collection_id).await.unwrap(),
        report.chunk_count
    );
    pool.close().await;
}

#[tokio::test]
async fn unknown_scope_returns_zero_chunks_and_a_count() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    ingest(&pool, &embedder, &pages("real.pdf", &["real content"]))
        .await
        .unwrap();

    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let retriever = Retriever {
        index: &index,
        registry: &registry,
        embedder: &embedder,
        top_k: 4,
    };

    let scope: BTreeSet<String> = ["nonexistent.pdf".to_string()].into();
    let retrieval = retriever.retrieve("x", &scope).await.unwrap();
    assert!(retrieval.chunks.is_empty());
    assert_eq!(retrieval.unresolved_scope, 1);
    pool.close().await;
}

#[tokio::test]
async fn empty_scope_searches_the_whole_index() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    ingest(&pool, &embedder, &pages("a.pdf", &["apples"])).await.unwrap();
    ingest(&pool, &embedder, &pages("b.pdf", &["bananas"])).await.unwrap();

    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let retriever = Retriever {
        index: &index,
        registry: &registry,
        embedder: &embedder,
        top_k: 10,
    };

    let retrieval = retriever.retrieve("fruit", &BTreeSet::new()).await.unwrap();
    let mut sources: Vec<String> = retrieval
        .chunks
        .iter()
        .map(|c| c.record.metadata.source.clone())
        .collect();
    sources.sort();
    sources.dedup();
    assert_eq!(sources, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
    pool.close().await;
}

#[tokio::test]
async fn persisted_index_round_trips_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docchat.sqlite");

    let embedder = TestEmbedder;
    let pool = open(&path).await;
    let report = ingest(
        &pool,
        &embedder,
        &pages("persist.pdf", &["page one text", "page two text"]),
    )
    .await
    .unwrap();

    let index = SqliteIndex::new(pool.clone());
    let mut before = index
        .search(&test_vec("text"), &embedder.signature(), &RecordFilter::all(), 100)
        .await
        .unwrap();
    pool.close().await;

    // Reopen the database: same records, same metadata, same embeddings.
    let pool = open(&path).await;
    let index = SqliteIndex::new(pool.clone());
    let mut after = index
        .search(&test_vec("text"), &embedder.signature(), &RecordFilter::all(), 100)
        .await
        .unwrap();
    assert_eq!(
        index.record_count(&report.collection_id).await.unwrap(),
        report.chunk_count
    );

    let key = |r: &docchat::models::ScoredRecord| {
        (r.record.metadata.split_id, r.record.metadata.source.clone())
    };
    before.sort_by_key(key);
    after.sort_by_key(key);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.record, a.record);
    }
    pool.close().await;
}

#[tokio::test]
async fn embedding_space_mismatch_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let embedder = TestEmbedder;
    ingest(&pool, &embedder, &pages("a.pdf", &["some text"]))
        .await
        .unwrap();

    let index = SqliteIndex::new(pool.clone());
    let other = EmbedderSignature {
        model: "a-different-model".to_string(),
        dims: 4,
    };
    let err = index
        .search(&test_vec("some"), &other, &RecordFilter::all(), 4)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::EmbeddingSpaceMismatch { .. }));
    pool.close().await;
}

#[tokio::test]
async fn rebuild_is_atomic_under_concurrent_search() {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("docchat.sqlite")).await;

    let signature = EmbedderSignature {
        model: "test-embedder".to_string(),
        dims: 2,
    };

    let record = |split_id: u32| IndexRecord {
        content: format!("chunk {split_id}"),
        metadata: ChunkMetadata {
            source: "atomic.pdf".to_string(),
            split_id,
            page_indices: vec![1],
        },
        embedding: vec![1.0, 0.0],
    };
    let small: Vec<IndexRecord> = (0..3).map(record).collect();
    let large: Vec<IndexRecord> = (0..5).map(record).collect();

    let collection = collection_id_for("atomic.pdf");
    let writer_index = SqliteIndex::new(pool.clone());
    let writer_sig = signature.clone();
    let writer_collection = collection.clone();
    let writer_small = small.clone();
    let writer_large = large.clone();

    let writer = tokio::spawn(async move {
        for i in 0..40 {
            let records = if i % 2 == 0 {
                writer_small.clone()
            } else {
                writer_large.clone()
            };
            writer_index
                .rebuild_collection(&writer_collection, &writer_sig, records)
                .await
                .unwrap();
        }
    });

    let reader_index = SqliteIndex::new(pool.clone());
    for _ in 0..200 {
        let hits = reader_index
            .search(&[1.0, 0.0], &signature, &RecordFilter::all(), 100)
            .await
            .unwrap();
        // A reader sees the fully old or fully new collection, never a
        // partially replaced one.
        assert!(
            hits.is_empty() || hits.len() == 3 || hits.len() == 5,
            "observed partially rebuilt collection: {} records",
            hits.len()
        );
    }

    writer.await.unwrap();
    pool.close().await;
}
