//! Named vector collections.
//!
//! The [`VectorStore`] trait is the nearest-neighbor capability used by the
//! ingestion pipeline (insert) and the answering pipeline (search). Chunks
//! are grouped into collections by name; in this crate a collection is one
//! subject.
//!
//! Collections are implicit: inserting into an unknown name creates it, and
//! searching an unknown or empty collection returns no results.
//!
//! Results are ordered by descending cosine similarity, with ties broken by
//! insertion order. Because the order does not depend on `k`, the results
//! for a given `k` are always a prefix of the results for any larger `k`.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`SqliteVectorStore`] | `collections.sqlite` inside the vector store directory |
//! | [`InMemoryVectorStore`] | process memory (tests) |

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// An embedded chunk ready for insertion.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: serde_json::Value,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            metadata: chunk.metadata,
            vector,
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Appends records to `collection`, creating it if needed.
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Returns the `k` records of `collection` most similar to `query`.
    ///
    /// When `document_id` is given, only that document's chunks are considered.
    /// Fails if a stored vector's length differs from `query`'s, which means
    /// the collection was built with a different embedding model.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Removes every record of `document_id` from `collection`, returning how
    /// many were removed. Used before re-ingesting a document that failed
    /// part-way so a retry never leaves duplicate chunks.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize>;

    /// Number of records stored in `collection` (0 if it does not exist).
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Orders scored candidates by descending score, keeping insertion order for
/// ties, and keeps the first `k`.
pub(crate) fn rank(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    // sort_by is stable, so equal scores keep their insertion order.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(k);
    candidates
}

/// Errors when a stored vector cannot be compared with the query.
pub(crate) fn check_dims(collection: &str, stored: usize, query: usize) -> Result<()> {
    if stored != query {
        bail!(
            "collection '{}' holds {}-dim vectors but the query has {} dims; re-ingest with the current embedding model",
            collection,
            stored,
            query
        );
    }
    Ok(())
}
