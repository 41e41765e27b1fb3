//! Directory-backed [`VectorStore`] on SQLite.
//!
//! All collections live in one `collections.sqlite` file inside the
//! configured vector store directory, one row per chunk, with embeddings
//! stored as little-endian `f32` BLOBs. Search loads a collection's rows and
//! ranks them by brute-force cosine similarity, which is adequate for a
//! personal notes corpus.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::ScoredChunk;

use super::{check_dims, rank, VectorRecord, VectorStore};

/// File name of the collection database inside the vector store directory.
pub const COLLECTIONS_FILE: &str = "collections.sqlite";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Opens (creating if needed) the store rooted at `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create vector store dir: {}", dir.display()))?;
        let pool = db::connect_path(&dir.join(COLLECTIONS_FILE)).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_collection_entries_collection ON collection_entries(collection, document_id)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO collection_entries (collection, document_id, chunk_index, text, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(&record.document_id)
            .bind(record.chunk_index)
            .bind(&record.text)
            .bind(record.metadata.to_string())
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT document_id, chunk_index, text, metadata_json, embedding
            FROM collection_entries
            WHERE collection = ? AND (? IS NULL OR document_id = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(collection)
        .bind(document_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                check_dims(collection, vector.len(), query.len())?;
                let metadata_json: String = row.get("metadata_json");
                Ok(ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or(serde_json::json!({})),
                    score: cosine_similarity(query, &vector),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(rank(candidates, k))
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let result =
            sqlx::query("DELETE FROM collection_entries WHERE collection = ? AND document_id = ?")
                .bind(collection)
                .bind(document_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM collection_entries WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(n as usize)
    }
}
