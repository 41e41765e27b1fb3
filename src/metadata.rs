//! Subject and document bookkeeping.
//!
//! The [`MetadataStore`] trait is what the ingestion pipeline and the HTTP
//! layer need from the relational store. Every method is atomic on its own:
//! a crash between calls leaves at most the file currently being processed
//! as `pending` (or unrecorded), and the ingestion pipeline clears that
//! document's chunks before retrying it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Document, DocumentStatus, DocumentSummary, Subject};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns the subject named `name`, creating it on first sight.
    async fn get_or_create_subject(&self, name: &str) -> Result<Subject>;

    async fn get_subject(&self, id: i64) -> Result<Option<Subject>>;

    /// Current status of a document, or `None` if it has never been recorded.
    async fn get_document_status(&self, id: &str) -> Result<Option<DocumentStatus>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Inserts the document or overwrites its name, subject, and status.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    /// All processed documents, ordered by subject name then document name.
    async fn list_processed_documents(&self) -> Result<Vec<DocumentSummary>>;
}

/// SQLite implementation of [`MetadataStore`].
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Wraps an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `[db].path` and ensures the schema exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config)
            .await
            .with_context(|| format!("Failed to open database: {}", config.db.path.display()))?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        name: row.get("name"),
        subject_id: row.get("subject_id"),
        status: status.parse()?,
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_or_create_subject(&self, name: &str) -> Result<Subject> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO subjects (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM subjects WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Subject {
            id,
            name: name.to_string(),
        })
    }

    async fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let row = sqlx::query("SELECT id, name FROM subjects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Subject {
            id: r.get("id"),
            name: r.get("name"),
        }))
    }

    async fn get_document_status(&self, id: &str) -> Result<Option<DocumentStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        status.map(|s| s.parse()).transpose()
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, name, subject_id, status FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, name, subject_id, status, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                subject_id = excluded.subject_id,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.name)
        .bind(doc.subject_id)
        .bind(doc.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_processed_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.name AS subject_name, d.id AS doc_id, d.name AS doc_name
            FROM subjects s
            JOIN documents d ON s.id = d.subject_id
            WHERE d.status = 'processed'
            ORDER BY s.name, d.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentSummary {
                subject_name: row.get("subject_name"),
                id: row.get("doc_id"),
                name: row.get("doc_name"),
            })
            .collect())
    }
}
