//! # Sahayak CLI (`sahayak`)
//!
//! Ingests a folder of lecture notes into per-subject vector collections and
//! answers questions about them, from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! sahayak --config ./config/sahayak.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sahayak init` | Create the metadata database and vector store |
//! | `sahayak ingest` | Ingest new or previously failed notes files |
//! | `sahayak subjects` | List processed documents by subject |
//! | `sahayak ask <subject> "<question>"` | Answer a question from a subject's notes |
//! | `sahayak search <subject> "<query>"` | Show the closest chunks without generating |
//! | `sahayak serve` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! reports and answers go to stdout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use sahayak::chunk::TextSplitter;
use sahayak::config::{self, Config};
use sahayak::embedding::{self, EmbeddingProvider};
use sahayak::ingest::{IngestOptions, IngestPipeline};
use sahayak::llm::{self, LanguageModel};
use sahayak::metadata::{MetadataStore, SqliteMetadataStore};
use sahayak::migrate;
use sahayak::rag::{Responder, Scope};
use sahayak::server::{self, AppState};
use sahayak::vector_store::{SqliteVectorStore, VectorStore};

/// Sahayak: an academic assistant that answers questions from your own notes.
#[derive(Parser)]
#[command(name = "sahayak", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sahayak.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the metadata database and vector store. Safe to run repeatedly.
    Init,

    /// Ingest notes from `<notes.root>/<subject>/<file>`.
    ///
    /// Already processed files are skipped; failed files are retried.
    Ingest {
        /// Only ingest this subject directory.
        #[arg(long)]
        subject: Option<String>,

        /// Load and chunk files and report counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many files have been attempted.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List processed documents grouped by subject.
    Subjects,

    /// Answer a question from a subject's notes.
    Ask {
        subject: String,
        query: String,

        /// Restrict retrieval to one document id (see `subjects`).
        #[arg(long)]
        doc: Option<String>,
    },

    /// Show the chunks most similar to a query.
    Search {
        subject: String,
        query: String,

        /// Number of chunks to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the configured embedder, logging and degrading to `None` on failure.
fn build_embedder(cfg: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    match embedding::create_provider(&cfg.embedding) {
        Ok(provider) => provider,
        Err(e) => {
            error!(
                provider = %cfg.embedding.provider,
                error = %format!("{:#}", e),
                "Failed to initialize embedding provider"
            );
            None
        }
    }
}

fn build_llm(cfg: &Config) -> Option<Arc<dyn LanguageModel>> {
    match llm::create_model(&cfg.llm) {
        Ok(model) => model,
        Err(e) => {
            error!(
                provider = %cfg.llm.provider,
                error = %format!("{:#}", e),
                "Failed to initialize language model"
            );
            None
        }
    }
}

async fn build_responder(cfg: &Config) -> anyhow::Result<Responder> {
    let vectors: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::open(&cfg.vector_store.dir).await?);
    Ok(Responder::new(
        build_embedder(cfg),
        build_llm(cfg),
        vectors,
        cfg.retrieval.top_k,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            SqliteVectorStore::open(&cfg.vector_store.dir)
                .await?
                .close()
                .await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            subject,
            dry_run,
            limit,
        } => {
            let metadata = Arc::new(SqliteMetadataStore::connect(&cfg).await?);
            let vectors = Arc::new(SqliteVectorStore::open(&cfg.vector_store.dir).await?);
            // Dry runs never embed, so skip loading the model.
            let embedder = if dry_run { None } else { build_embedder(&cfg) };

            let options = IngestOptions {
                subject,
                dry_run,
                limit,
                ..IngestOptions::from_config(&cfg)
            };
            let pipeline = IngestPipeline::new(
                metadata.clone(),
                vectors.clone(),
                embedder,
                TextSplitter::from_config(&cfg.chunking)?,
                options,
            )?;
            let report = pipeline.run(&cfg.notes.root).await?;
            report.print();

            metadata.close().await;
            vectors.close().await;
        }
        Commands::Subjects => {
            let metadata = SqliteMetadataStore::connect(&cfg).await?;
            let docs = metadata.list_processed_documents().await?;

            let mut grouped: BTreeMap<&str, Vec<_>> = BTreeMap::new();
            for doc in &docs {
                grouped.entry(doc.subject_name.as_str()).or_default().push(doc);
            }
            println!("subjects: {}", grouped.len());
            for (subject, docs) in grouped {
                println!("{}", subject);
                for doc in docs {
                    println!("  {}  {}", doc.id, doc.name);
                }
            }
            metadata.close().await;
        }
        Commands::Ask {
            subject,
            query,
            doc,
        } => {
            let responder = build_responder(&cfg).await?;
            let scope = match doc {
                Some(document_id) => Scope::Document {
                    subject,
                    document_id,
                },
                None => Scope::Subject(subject),
            };
            println!("{}", responder.answer_in(&scope, &query).await);
        }
        Commands::Search { subject, query, k } => {
            let responder = build_responder(&cfg).await?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let hits = responder
                .retrieve(&Scope::Subject(subject.clone()), &query, k)
                .await?;

            println!("search {} (k={})", subject, k);
            if hits.is_empty() {
                println!("  no results");
            }
            for (rank, hit) in hits.iter().enumerate() {
                let preview: String = hit.text.chars().take(160).collect();
                println!(
                    "{}. [{:.4}] {} #{}",
                    rank + 1,
                    hit.score,
                    hit.document_id,
                    hit.chunk_index
                );
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Commands::Serve => {
            let responder = build_responder(&cfg).await?;
            if !responder.models_available() {
                warn!("Embedding provider or language model unavailable; chat will return a fallback message");
            }
            let metadata: Option<Arc<dyn MetadataStore>> =
                match SqliteMetadataStore::connect(&cfg).await {
                    Ok(store) => Some(Arc::new(store) as Arc<dyn MetadataStore>),
                    Err(e) => {
                        error!(error = %format!("{:#}", e), "Metadata database unavailable");
                        None
                    }
                };
            let state = AppState {
                responder: Arc::new(responder),
                metadata,
            };
            server::run_server(&cfg, state).await?;
        }
    }

    Ok(())
}
