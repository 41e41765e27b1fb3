//! Ingestion pipeline orchestration.
//!
//! Walks the `<notes_root>/<subject>/<file>` tree and moves every new notes
//! file through load → chunk → embed → insert into the subject's vector
//! collection, recording a `processed` or `failed` status per document.
//!
//! Runs are idempotent: processed documents are skipped by their content
//! address, and anything else (failed, pending, or unrecorded) is retried on
//! the next run after clearing whatever chunks an earlier attempt left behind. A failure is
//! confined to the file that caused it; the rest of the batch carries on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::chunk::{chunk_units, TextSplitter};
use crate::config::Config;
use crate::content_id;
use crate::embedding::{embed_batched, EmbeddingProvider};
use crate::extract::{load_file, LoadOutcome};
use crate::metadata::MetadataStore;
use crate::models::{Document, DocumentStatus, Subject};
use crate::vector_store::{VectorRecord, VectorStore};

/// Knobs for a single ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Only ingest the subject with this exact directory name.
    pub subject: Option<String>,
    /// Load and chunk, but write nothing.
    pub dry_run: bool,
    /// Stop after this many files have been attempted (processed or failed).
    pub limit: Option<usize>,
    /// Patterns matched against paths relative to the notes root.
    pub exclude_globs: Vec<String>,
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            subject: None,
            dry_run: false,
            limit: None,
            exclude_globs: Vec::new(),
            batch_size: 64,
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclude_globs: config.notes.exclude_globs.clone(),
            batch_size: config.embedding.batch_size,
            ..Self::default()
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub subjects: u64,
    pub files_seen: u64,
    pub processed: u64,
    /// Already processed on an earlier run.
    pub skipped: u64,
    pub unsupported: u64,
    pub failed: u64,
    pub chunks_written: u64,
    pub dry_run: bool,
}

impl IngestReport {
    pub fn print(&self) {
        if self.dry_run {
            println!("ingest (dry-run)");
        } else {
            println!("ingest");
        }
        println!("  subjects: {}", self.subjects);
        println!("  files seen: {}", self.files_seen);
        println!("  processed: {}", self.processed);
        println!("  skipped (already processed): {}", self.skipped);
        println!("  unsupported: {}", self.unsupported);
        println!("  failed: {}", self.failed);
        if self.dry_run {
            println!("  estimated chunks: {}", self.chunks_written);
        } else {
            println!("  chunks written: {}", self.chunks_written);
        }
        println!("ok");
    }

    fn attempted(&self) -> u64 {
        self.processed + self.failed
    }
}

enum FileOutcome {
    Processed { chunks: usize },
    AlreadyProcessed,
    Unsupported(String),
}

pub struct IngestPipeline {
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    splitter: TextSplitter,
    options: IngestOptions,
    excludes: GlobSet,
}

impl IngestPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        splitter: TextSplitter,
        options: IngestOptions,
    ) -> Result<Self> {
        let excludes = build_globset(&options.exclude_globs)?;
        Ok(Self {
            metadata,
            vectors,
            embedder,
            splitter,
            options,
            excludes,
        })
    }

    /// Ingests every subject directory under `notes_root`.
    ///
    /// Errors only when the batch cannot start (missing root, no embedder)
    /// or when the metadata store fails while resolving a subject.
    pub async fn run(&self, notes_root: &Path) -> Result<IngestReport> {
        if !notes_root.is_dir() {
            bail!("Notes root does not exist: {}", notes_root.display());
        }
        if !self.options.dry_run && self.embedder.is_none() {
            bail!("Embedding provider not available. Configure [embedding] to ingest notes.");
        }

        // Document ids hash the full path, so resolve the root once up front.
        let root = notes_root
            .canonicalize()
            .unwrap_or_else(|_| notes_root.to_path_buf());

        let mut report = IngestReport {
            dry_run: self.options.dry_run,
            ..IngestReport::default()
        };

        for (subject_name, subject_dir) in self.list_subjects(&root)? {
            if self.limit_reached(&report) {
                break;
            }
            if let Some(only) = &self.options.subject {
                if *only != subject_name {
                    continue;
                }
            }

            report.subjects += 1;
            info!(subject = %subject_name, "Processing subject");

            let subject = if self.options.dry_run {
                None
            } else {
                Some(
                    self.metadata
                        .get_or_create_subject(&subject_name)
                        .await
                        .with_context(|| format!("Failed to resolve subject '{}'", subject_name))?,
                )
            };

            for path in self.list_files(&root, &subject_dir)? {
                if self.limit_reached(&report) {
                    break;
                }
                report.files_seen += 1;
                self.ingest_one(&subject_name, subject.as_ref(), &path, &mut report)
                    .await;
            }
        }

        Ok(report)
    }

    fn limit_reached(&self, report: &IngestReport) -> bool {
        self.options
            .limit
            .is_some_and(|limit| report.attempted() >= limit as u64)
    }

    async fn ingest_one(
        &self,
        subject_name: &str,
        subject: Option<&Subject>,
        path: &Path,
        report: &mut IngestReport,
    ) {
        let doc_id = content_id::document_id(path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match self.process_file(subject, path, &doc_id, &file_name).await {
            Ok(FileOutcome::Processed { chunks }) => {
                info!(subject = %subject_name, file = %file_name, chunks, "Processed file");
                report.processed += 1;
                report.chunks_written += chunks as u64;
            }
            Ok(FileOutcome::AlreadyProcessed) => {
                info!(subject = %subject_name, file = %file_name, "Skipping already processed file");
                report.skipped += 1;
            }
            Ok(FileOutcome::Unsupported(ext)) => {
                warn!(
                    subject = %subject_name,
                    file = %file_name,
                    extension = %ext,
                    "Unsupported file type, skipping"
                );
                report.unsupported += 1;
            }
            Err(e) => {
                error!(
                    subject = %subject_name,
                    file = %path.display(),
                    error = %format!("{:#}", e),
                    "Failed to ingest file"
                );
                report.failed += 1;
                if let Some(subject) = subject {
                    let doc = Document {
                        id: doc_id,
                        name: file_name,
                        subject_id: subject.id,
                        status: DocumentStatus::Failed,
                    };
                    if let Err(e) = self.metadata.upsert_document(&doc).await {
                        error!(file = %path.display(), error = %e, "Failed to record failed status");
                    }
                }
            }
        }
    }

    async fn process_file(
        &self,
        subject: Option<&Subject>,
        path: &Path,
        doc_id: &str,
        file_name: &str,
    ) -> Result<FileOutcome> {
        let status = self.metadata.get_document_status(doc_id).await?;
        if status == Some(DocumentStatus::Processed) {
            return Ok(FileOutcome::AlreadyProcessed);
        }

        let units = match load_file(path) {
            LoadOutcome::Loaded(units) => units,
            LoadOutcome::Unsupported(ext) => return Ok(FileOutcome::Unsupported(ext)),
            LoadOutcome::Failed(e) => return Err(e.into()),
        };

        let chunks = chunk_units(doc_id, &units, &self.splitter);
        if chunks.is_empty() {
            warn!(file = %file_name, "No text extracted");
        }
        let chunk_count = chunks.len();

        if self.options.dry_run {
            return Ok(FileOutcome::Processed {
                chunks: chunk_count,
            });
        }

        let subject =
            subject.ok_or_else(|| anyhow::anyhow!("subject not resolved for {}", file_name))?;
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider not available"))?;

        // Anything not yet processed may have chunks from an interrupted or
        // failed attempt, with or without a metadata row.
        let removed = self
            .vectors
            .delete_document(&subject.name, doc_id)
            .await?;
        if removed > 0 {
            info!(file = %file_name, removed, ?status, "Cleared chunks from earlier attempt");
        }

        let mut doc = Document {
            id: doc_id.to_string(),
            name: file_name.to_string(),
            subject_id: subject.id,
            status: DocumentStatus::Pending,
        };
        self.metadata.upsert_document(&doc).await?;

        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_batched(embedder.as_ref(), &texts, self.options.batch_size)
                .await
                .context("Embedding failed")?;
            let records: Vec<VectorRecord> = chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector))
                .collect();
            self.vectors
                .insert(&subject.name, &records)
                .await
                .context("Vector store insert failed")?;
        }

        doc.status = DocumentStatus::Processed;
        self.metadata.upsert_document(&doc).await?;

        Ok(FileOutcome::Processed {
            chunks: chunk_count,
        })
    }

    /// Immediate subdirectories of the root, sorted by name.
    fn list_subjects(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut subjects = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.excludes.is_match(&name) {
                continue;
            }
            subjects.push((name, entry.into_path()));
        }
        Ok(subjects)
    }

    /// Regular files directly inside a subject directory, sorted by name.
    fn list_files(&self, root: &Path, subject_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(subject_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.excludes.is_match(relative) {
                continue;
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}
