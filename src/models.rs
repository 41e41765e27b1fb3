//! Core data models used throughout Sahayak.
//!
//! These types represent the subjects, documents, text units, chunks, and
//! retrieval results that flow through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named grouping of documents (one directory under the notes root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
}

/// Processing state of a document.
///
/// `Processed` is terminal: the ingestion pipeline never touches a processed
/// document again. `Pending` marks a document whose chunks are being written;
/// it and `Failed` are both retried on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processed" => Ok(DocumentStatus::Processed),
            "failed" => Ok(DocumentStatus::Failed),
            other => anyhow::bail!("unknown document status: '{}'", other),
        }
    }
}

/// One physical notes file as recorded in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub subject_id: i64,
    pub status: DocumentStatus,
}

/// A processed document listed under its subject (for `GET /api/subjects`).
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    #[serde(skip)]
    pub subject_name: String,
    pub id: String,
    pub name: String,
}

/// One unit of extracted text plus where it came from.
///
/// PDFs produce a single unit; slide decks produce one unit per slide.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A bounded span of document text, ready to embed.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: serde_json::Value,
    /// Cosine similarity to the query vector; higher is closer.
    pub score: f32,
}
