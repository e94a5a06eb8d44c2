//! # docchat CLI
//!
//! The `docchat` binary is the command-line shaping of the library. It
//! provides commands for database initialization, document ingestion,
//! listing, and question answering (one-shot and interactive).
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat ingest <files…>` | Extract, chunk, embed, and index documents |
//! | `docchat documents` | List ingested documents and their collections |
//! | `docchat ask "<question>"` | Answer one question (optionally scoped) |
//! | `docchat chat` | Interactive multi-turn session (`/reset` clears it) |

use std::collections::BTreeSet;
use std::io::{BufRead, Write as IoWrite};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use docchat::chat::{ChatEngine, Conversation};
use docchat::config::{load_config, Config};
use docchat::embedding::create_embedder;
use docchat::extract::extract_pages;
use docchat::generate::create_generator;
use docchat::index::sqlite::SqliteIndex;
use docchat::ingest::IngestPipeline;
use docchat::registry::DocumentRegistry;
use docchat::retrieve::Retriever;
use docchat::{db, migrate};

/// docchat — chat with paginated documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with database, chunking, embedding, and generation settings.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with paginated documents — scoped retrieval with page provenance",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest documents: extract pages, chunk, embed, and index.
    ///
    /// Re-ingesting a filename replaces its prior collection; a failure
    /// on one file does not affect the others.
    Ingest {
        /// Files to ingest (.pdf, .txt, .md).
        files: Vec<PathBuf>,
    },

    /// List ingested documents and their collection ids.
    Documents,

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,
        /// Restrict retrieval to these ingested filenames. Empty means
        /// all documents.
        #[arg(long)]
        scope: Vec<String>,
    },

    /// Interactive multi-turn chat session.
    Chat {
        /// Restrict retrieval to these ingested filenames.
        #[arg(long)]
        scope: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { files } => run_ingest(&config, &files).await,
        Commands::Documents => run_documents(&config).await,
        Commands::Ask { question, scope } => run_ask(&config, &question, scope).await,
        Commands::Chat { scope } => run_chat(&config, scope).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest(config: &Config, files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("no files given");
    }

    let pool = db::connect(&config.db.path).await?;
    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;

    let pipeline = IngestPipeline {
        index: &index,
        registry: &registry,
        embedder: embedder.as_ref(),
        window_chars: config.chunking.window_chars,
        overlap_chars: config.chunking.overlap_chars,
        batch_size: config.embedding.batch_size,
    };

    let mut failed = 0usize;
    for file in files {
        let pages = match extract_pages(file) {
            Ok(pages) => pages,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", file.display(), e);
                failed += 1;
                continue;
            }
        };
        let page_count = pages.len();
        let handle = file.display().to_string();

        match pipeline.ingest_document(&pages, &handle).await {
            Ok(report) => {
                println!("ingest {}", pages[0].source);
                println!("  pages: {}", page_count);
                println!("  chunks: {}", report.chunk_count);
                println!("  collection: {}", report.collection_id);
            }
            Err(e) => {
                eprintln!("Warning: ingesting {} failed: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    pool.close().await;
    if failed > 0 {
        anyhow::bail!("{failed} document(s) failed to ingest");
    }
    println!("ok");
    Ok(())
}

async fn run_documents(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let registry = DocumentRegistry::new(pool.clone());
    let entries = registry.list().await?;

    if entries.is_empty() {
        println!("No documents ingested.");
    }
    for entry in &entries {
        println!("{}  {}", entry.filename, entry.collection_id);
    }

    pool.close().await;
    Ok(())
}

async fn run_ask(config: &Config, question: &str, scope: Vec<String>) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    let engine = ChatEngine {
        retriever: Retriever {
            index: &index,
            registry: &registry,
            embedder: embedder.as_ref(),
            top_k: config.retrieval.top_k,
        },
        generator: generator.as_ref(),
        max_context_chars: config.chat.max_context_chars,
    };

    let conversation = Conversation::new();
    let scope: BTreeSet<String> = scope.into_iter().collect();
    let answer = engine
        .ask(&conversation, question, &scope)
        .await
        .context("failed to answer question")?;

    print_answer(&answer);
    pool.close().await;
    Ok(())
}

async fn run_chat(config: &Config, scope: Vec<String>) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let index = SqliteIndex::new(pool.clone());
    let registry = DocumentRegistry::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    let engine = ChatEngine {
        retriever: Retriever {
            index: &index,
            registry: &registry,
            embedder: embedder.as_ref(),
            top_k: config.retrieval.top_k,
        },
        generator: generator.as_ref(),
        max_context_chars: config.chat.max_context_chars,
    };

    let conversation = Conversation::new();
    let scope: BTreeSet<String> = scope.into_iter().collect();

    println!("docchat — ask about your documents ('/reset' clears, 'exit' quits)");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                conversation.reset();
                println!("(conversation cleared)");
                continue;
            }
            question => match engine.ask(&conversation, question, &scope).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    pool.close().await;
    Ok(())
}

fn print_answer(answer: &docchat::models::Answer) {
    println!("{}", answer.answer);
    if !answer.cited_sources.is_empty() {
        println!("sources: {}", answer.cited_sources.join(", "));
    }
    if answer.unresolved_scope > 0 {
        println!(
            "note: {} scope document(s) not found in the index",
            answer.unresolved_scope
        );
    }
}
