use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sahayak_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sahayak");
    path
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
                "<?xml version=\"1.0\"?><p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                text
            );
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let physics = root.join("notes").join("Physics");
    fs::create_dir_all(&physics).unwrap();
    fs::write(
        physics.join("mechanics.pptx"),
        pptx_with_slides(&[
            "Newton's second law states that F = ma",
            "Momentum is the product of mass and velocity",
        ]),
    )
    .unwrap();
    fs::write(physics.join("todo.txt"), "buy a new lab coat").unwrap();

    let chemistry = root.join("notes").join("Chemistry");
    fs::create_dir_all(&chemistry).unwrap();
    fs::write(
        chemistry.join("bonds.pptx"),
        pptx_with_slides(&["Covalent bonds share electron pairs"]),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sahayak.sqlite"

[notes]
root = "{root}/notes"

[vector_store]
dir = "{root}/vector_store"

[retrieval]
top_k = 3

[server]
bind = "127.0.0.1:7399"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sahayak.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sahayak(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sahayak_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sahayak binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sahayak(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/sahayak.sqlite").exists());
    assert!(tmp.path().join("vector_store/collections.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sahayak(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sahayak(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sahayak(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest (dry-run)"));
    assert!(stdout.contains("subjects: 2"));
    assert!(stdout.contains("processed: 2"));
    assert!(stdout.contains("unsupported: 1"));
    assert!(stdout.contains("estimated chunks: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_dry_run_single_subject() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sahayak(
        &config_path,
        &["ingest", "--dry-run", "--subject", "Chemistry"],
    );
    assert!(success);
    assert!(stdout.contains("subjects: 1"));
    assert!(stdout.contains("processed: 1"));
}

#[test]
fn test_ingest_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sahayak(&config_path, &["ingest"]);
    assert!(!success, "ingest without an embedder should fail");
    assert!(stderr.contains("Embedding provider not available"));
}

#[test]
fn test_subjects_empty_before_ingest() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["init"]);
    let (stdout, stderr, success) = run_sahayak(&config_path, &["subjects"]);
    assert!(success, "subjects failed: {}", stderr);
    assert!(stdout.contains("subjects: 0"));
}

#[test]
fn test_ask_without_models_degrades() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sahayak(
        &config_path,
        &["ask", "Physics", "What is Newton's second law?"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(
        stdout.trim(),
        "Models are not available. Please check the server logs."
    );
}

#[test]
fn test_search_errors_when_embeddings_disabled() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sahayak(&config_path, &["search", "Physics", "momentum"]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider not available"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_sahayak(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_chunking_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_sahayak(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
