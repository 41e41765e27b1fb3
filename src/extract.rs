//! Document loading for notes files (PDF and PPTX slide decks).
//!
//! [`load_file`] dispatches on the file extension and returns a tagged
//! [`LoadOutcome`] so callers pattern-match the three cases instead of
//! relying on errors for control flow:
//!
//! - [`LoadOutcome::Loaded`]: ordered text units with source metadata,
//! - [`LoadOutcome::Unsupported`]: the extension is not a notes format (skip),
//! - [`LoadOutcome::Failed`]: the file could not be read or parsed.

use std::io::Read;
use std::path::Path;

use serde_json::json;
use thiserror::Error;

use crate::models::TextUnit;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const SLIDE_PREFIX: &str = "ppt/slides/slide";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Result of loading one file.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Vec<TextUnit>),
    /// Carries the offending extension (lowercased, may be empty).
    Unsupported(String),
    Failed(ExtractError),
}

/// Notes formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Pptx,
}

impl DocumentFormat {
    /// Detects the format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "pptx" => Ok(DocumentFormat::Pptx),
            _ => Err(ext),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Pptx => "pptx",
        }
    }
}

/// Loads a notes file into text units.
pub fn load_file(path: &Path) -> LoadOutcome {
    let format = match DocumentFormat::from_path(path) {
        Ok(f) => f,
        Err(ext) => return LoadOutcome::Unsupported(ext),
    };

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return LoadOutcome::Failed(e.into()),
    };

    let source = path.to_string_lossy().to_string();
    match extract_units(&bytes, format, &source) {
        Ok(units) => LoadOutcome::Loaded(units),
        Err(e) => LoadOutcome::Failed(e),
    }
}

/// Extracts text units from in-memory file contents.
pub fn extract_units(
    bytes: &[u8],
    format: DocumentFormat,
    source: &str,
) -> Result<Vec<TextUnit>, ExtractError> {
    match format {
        DocumentFormat::Pdf => {
            let text = extract_pdf(bytes)?;
            Ok(vec![TextUnit {
                text,
                metadata: json!({ "source": source, "format": format.as_str() }),
            }])
        }
        DocumentFormat::Pptx => {
            let slides = extract_pptx_slides(bytes)?;
            Ok(slides
                .into_iter()
                .map(|(number, text)| TextUnit {
                    text,
                    metadata: json!({
                        "source": source,
                        "format": format.as_str(),
                        "slide": number,
                    }),
                })
                .collect())
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs; keep that contained to this file.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Returns `(slide_number, text)` for every slide with text, in slide order.
fn extract_pptx_slides(bytes: &[u8]) -> Result<Vec<(u32, String)>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with(SLIDE_PREFIX) && n.ends_with(".xml"))
        .filter_map(|n| {
            n.trim_start_matches(SLIDE_PREFIX)
                .trim_end_matches(".xml")
                .parse::<u32>()
                .ok()
                .map(|num| (num, n.to_string()))
        })
        .collect();
    if slides.is_empty() {
        return Err(ExtractError::Ooxml("no slides found".to_string()));
    }
    slides.sort_by_key(|(num, _)| *num);

    let mut out = Vec::with_capacity(slides.len());
    for (num, name) in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_slide_text(&xml)?;
        if !text.is_empty() {
            out.push((num, text));
        }
    }
    Ok(out)
}

/// Collects `a:t` runs, one line per `a:p` paragraph.
fn extract_slide_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                line.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => flush_line(&mut lines, &mut line),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => {
                flush_line(&mut lines, &mut line)
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    flush_line(&mut lines, &mut line);
    Ok(lines.join("\n"))
}

fn flush_line(lines: &mut Vec<String>, line: &mut String) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
    line.clear();
}
