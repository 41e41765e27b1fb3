//! In-memory [`VectorStore`] implementation for tests.
//!
//! Records live in a `HashMap` of collection name to insertion-ordered
//! `Vec`, behind a `std::sync::RwLock`. Search is brute-force cosine
//! similarity.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::ScoredChunk;

use super::{check_dims, rank, VectorRecord, VectorStore};

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let candidates = records
            .iter()
            .filter(|r| document_id.map_or(true, |id| r.document_id == id))
            .map(|r| {
                check_dims(collection, r.vector.len(), query.len())?;
                Ok(ScoredChunk {
                    document_id: r.document_id.clone(),
                    chunk_index: r.chunk_index,
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                    score: cosine_similarity(query, &r.vector),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rank(candidates, k))
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| r.document_id != document_id);
        Ok(before - records.len())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(collection).map_or(0, Vec::len))
    }
}
