//! Retrieval-augmented answering.
//!
//! The [`Responder`] embeds a question, pulls the closest chunks from a
//! subject collection, and asks the language model to answer from those
//! chunks alone. [`Responder::answer`] never fails: missing capabilities and
//! runtime errors turn into fixed, user-facing messages, with the details
//! going to the log.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::llm::LanguageModel;
use crate::models::ScoredChunk;
use crate::vector_store::VectorStore;

pub const MODELS_UNAVAILABLE: &str = "Models are not available. Please check the server logs.";

/// Returned when nothing relevant was retrieved, and the phrase the model is
/// told to reply with verbatim when the context lacks the answer.
pub const NOT_IN_CONTEXT: &str = "The answer is not available in these notes.";

pub const GENERIC_ERROR: &str =
    "An error occurred while processing your request. Please check the server logs.";

const PERSONA: &str = "You are 'Sahayak', a helpful academic assistant.";

/// Which chunks a question is answered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The whole subject collection.
    Subject(String),
    /// One document inside its subject's collection.
    Document {
        subject: String,
        document_id: String,
    },
}

impl Scope {
    pub fn collection(&self) -> &str {
        match self {
            Scope::Subject(name) => name,
            Scope::Document { subject, .. } => subject,
        }
    }

    fn document_id(&self) -> Option<&str> {
        match self {
            Scope::Subject(_) => None,
            Scope::Document { document_id, .. } => Some(document_id),
        }
    }
}

pub struct Responder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn LanguageModel>>,
    vectors: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Responder {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<Arc<dyn LanguageModel>>,
        vectors: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            llm,
            vectors,
            top_k,
        }
    }

    /// True when both the embedder and the language model are configured.
    pub fn models_available(&self) -> bool {
        self.embedder.is_some() && self.llm.is_some()
    }

    /// Answers `query` from the collection named `collection_key`.
    pub async fn answer(&self, collection_key: &str, query: &str) -> String {
        self.answer_in(&Scope::Subject(collection_key.to_string()), query)
            .await
    }

    pub async fn answer_in(&self, scope: &Scope, query: &str) -> String {
        let (Some(embedder), Some(llm)) = (&self.embedder, &self.llm) else {
            return MODELS_UNAVAILABLE.to_string();
        };

        match self
            .try_answer(embedder.as_ref(), llm.as_ref(), scope, query)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!(
                    collection = %scope.collection(),
                    error = %format!("{:#}", e),
                    "Failed to answer query"
                );
                GENERIC_ERROR.to_string()
            }
        }
    }

    async fn try_answer(
        &self,
        embedder: &dyn EmbeddingProvider,
        llm: &dyn LanguageModel,
        scope: &Scope,
        query: &str,
    ) -> Result<String> {
        let chunks = self.search(embedder, scope, query, self.top_k).await?;
        if chunks.is_empty() {
            info!(collection = %scope.collection(), "No chunks retrieved");
            return Ok(NOT_IN_CONTEXT.to_string());
        }

        let prompt = build_prompt(&chunks, query);
        let answer = llm.generate(&prompt).await?;
        Ok(answer.trim().to_string())
    }

    /// Returns the `k` chunks closest to `query` within `scope`.
    pub async fn retrieve(&self, scope: &Scope, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider not available"))?;
        self.search(embedder.as_ref(), scope, query, k).await
    }

    async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        scope: &Scope,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(embedder, query).await?;
        self.vectors
            .search(scope.collection(), &query_vec, k, scope.document_id())
            .await
    }
}

/// Assembles the grounded prompt sent to the language model.
pub fn build_prompt(chunks: &[ScoredChunk], query: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{PERSONA}\n\
         Answer the user's question based only on the following context from their notes.\n\
         If the answer is not in the context, say exactly: \"{NOT_IN_CONTEXT}\"\n\
         Be concise and clear.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Answer:"
    )
}
