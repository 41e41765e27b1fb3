//! End-to-end: ingest a notes tree, then answer over the library API and HTTP.
//!
//! Uses a deterministic bag-of-words embedder and an extractive language
//! model so the full pipeline runs offline.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use sahayak::chunk::TextSplitter;
use sahayak::content_id;
use sahayak::db;
use sahayak::embedding::EmbeddingProvider;
use sahayak::ingest::{IngestOptions, IngestPipeline};
use sahayak::llm::LanguageModel;
use sahayak::metadata::{MetadataStore, SqliteMetadataStore};
use sahayak::migrate;
use sahayak::models::DocumentStatus;
use sahayak::rag::{Responder, NOT_IN_CONTEXT};
use sahayak::server::{self, AppState};
use sahayak::vector_store::{SqliteVectorStore, VectorStore};

// ─── Fakes ──────────────────────────────────────────────────────────

struct BagOfWords;

impl BagOfWords {
    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % 64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        64
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| BagOfWords::vector(t)).collect())
    }
}

/// Replies with the first context line sharing a word of 4+ letters with
/// the question, or the fallback phrase.
struct Extractive {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for Extractive {
    fn model_name(&self) -> &str {
        "extractive"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion: ").next())
            .unwrap_or_default();
        let question = prompt
            .split("Question: ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default()
            .to_lowercase();
        let hit = context.lines().map(str::trim).find(|line| {
            line.split_whitespace()
                .any(|w| w.len() >= 4 && question.contains(&w.to_lowercase()))
        });
        Ok(hit.unwrap_or(NOT_IN_CONTEXT).to_string())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

/// Single-page PDF showing `text` in Helvetica, with a correct xref table.
fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (i, text) in slides.iter().enumerate() {
            zip.start_file(
                format!("ppt/slides/slide{}.xml", i + 1),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let xml = format!(
                "<p:sld xmlns:a=\"a\" xmlns:p=\"p\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                text
            );
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

struct Env {
    _tmp: TempDir,
    notes: std::path::PathBuf,
    metadata: Arc<SqliteMetadataStore>,
    vectors: Arc<SqliteVectorStore>,
    llm: Arc<Extractive>,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let notes = tmp.path().join("notes");
    std::fs::create_dir_all(notes.join("Physics")).unwrap();
    std::fs::create_dir_all(notes.join("Chemistry")).unwrap();
    std::fs::write(
        notes.join("Physics/lecture1.pdf"),
        minimal_pdf("Newton's second law states that F = ma"),
    )
    .unwrap();
    std::fs::write(
        notes.join("Physics/lecture2.pptx"),
        pptx_with_slides(&[
            "Ohm's law relates voltage and current",
            "Resistance is measured in ohms",
        ]),
    )
    .unwrap();
    std::fs::write(notes.join("Physics/broken.pdf"), b"%PDF-1.4 truncated").unwrap();
    std::fs::write(
        notes.join("Chemistry/bonds.pptx"),
        pptx_with_slides(&["Covalent bonds share electron pairs"]),
    )
    .unwrap();

    let pool = db::connect_path(&tmp.path().join("data/sahayak.sqlite"))
        .await
        .unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let vectors = SqliteVectorStore::open(&tmp.path().join("vector_store"))
        .await
        .unwrap();

    Env {
        notes,
        metadata: Arc::new(SqliteMetadataStore::new(pool)),
        vectors: Arc::new(vectors),
        llm: Arc::new(Extractive {
            calls: AtomicUsize::new(0),
        }),
        _tmp: tmp,
    }
}

fn pipeline(env: &Env) -> IngestPipeline {
    IngestPipeline::new(
        env.metadata.clone(),
        env.vectors.clone(),
        Some(Arc::new(BagOfWords)),
        TextSplitter::new(1000, 200).unwrap(),
        IngestOptions::default(),
    )
    .unwrap()
}

fn responder(env: &Env) -> Responder {
    Responder::new(
        Some(Arc::new(BagOfWords)),
        Some(env.llm.clone()),
        env.vectors.clone(),
        3,
    )
}

fn physics_doc_id(env: &Env, file: &str) -> String {
    let path = env.notes.join("Physics").join(file);
    content_id::document_id(&path.canonicalize().unwrap())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_answer_physics_question() {
    let env = setup().await;

    let report = pipeline(&env).run(&env.notes).await.unwrap();
    assert_eq!(report.subjects, 2);
    assert_eq!(report.files_seen, 4);
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);

    assert_eq!(
        env.metadata
            .get_document_status(&physics_doc_id(&env, "lecture1.pdf"))
            .await
            .unwrap(),
        Some(DocumentStatus::Processed)
    );
    assert_eq!(
        env.metadata
            .get_document_status(&physics_doc_id(&env, "broken.pdf"))
            .await
            .unwrap(),
        Some(DocumentStatus::Failed)
    );

    let answer = responder(&env)
        .answer("Physics", "What is Newton's second law?")
        .await;
    assert!(answer.contains("F = ma"), "unexpected answer: {}", answer);
}

#[tokio::test]
async fn rerun_adds_nothing() {
    let env = setup().await;
    let p = pipeline(&env);
    p.run(&env.notes).await.unwrap();
    let before = env.vectors.count("Physics").await.unwrap();

    let again = p.run(&env.notes).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.skipped, 3);
    // The broken file is retried and fails again.
    assert_eq!(again.failed, 1);
    assert_eq!(env.vectors.count("Physics").await.unwrap(), before);
}

#[tokio::test]
async fn unknown_subject_falls_back_without_generation() {
    let env = setup().await;
    pipeline(&env).run(&env.notes).await.unwrap();

    let answer = responder(&env)
        .answer("NonexistentSubject", "What is F=ma?")
        .await;
    assert_eq!(answer, NOT_IN_CONTEXT);
    assert_eq!(env.llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unrelated_question_gets_not_in_context() {
    let env = setup().await;
    pipeline(&env).run(&env.notes).await.unwrap();
    assert!(env.vectors.count("Physics").await.unwrap() > 0);

    let answer = responder(&env)
        .answer("Physics", "What is photosynthesis?")
        .await;
    assert_eq!(answer, NOT_IN_CONTEXT);
    // Chunks were retrieved, so the model was asked and declined.
    assert_eq!(env.llm.calls.load(Ordering::SeqCst), 1);
}

// ─── HTTP ───────────────────────────────────────────────────────────

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn spawn_server(env: &Env) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let metadata: Arc<dyn MetadataStore> = env.metadata.clone();
    let state = AppState {
        responder: Arc::new(responder(env)),
        metadata: Some(metadata),
    };
    tokio::spawn(async move {
        server::serve(listener, state).await.unwrap();
    });
    wait_for_server(port).await;
    port
}

#[tokio::test]
async fn http_subjects_and_chat() {
    let env = setup().await;
    pipeline(&env).run(&env.notes).await.unwrap();
    let port = spawn_server(&env).await;
    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let resp = client
        .get(format!("{}/api/subjects", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let physics: Vec<&str> = body["Physics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(physics, vec!["lecture1.pdf", "lecture2.pptx"]);
    assert_eq!(body["Chemistry"].as_array().unwrap().len(), 1);

    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&serde_json::json!({
            "subject_name": "Physics",
            "query": "What is Newton's second law?"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["answer"].as_str().unwrap().contains("F = ma"));

    // Document scope: only lecture2's chunks are eligible.
    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&serde_json::json!({
            "doc_id": physics_doc_id(&env, "lecture2.pptx"),
            "query": "What does Ohm's law relate?"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["answer"].as_str().unwrap().contains("voltage"));
}

#[tokio::test]
async fn http_chat_errors() {
    let env = setup().await;
    let port = spawn_server(&env).await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/chat", port);

    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "subject_name": "Physics" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "doc_id": "0".repeat(64), "query": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn health_reports_version() {
    let env = setup().await;
    let port = spawn_server(&env).await;
    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}
