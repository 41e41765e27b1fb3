//! Recursive character text splitter.
//!
//! Splits extracted text into overlapping chunks of at most `chunk_size`
//! characters. Splitting prefers paragraph breaks, then line breaks, then
//! spaces, and only falls back to a hard character cut when a single word is
//! longer than a chunk. Adjacent pieces are merged greedily; when a chunk is
//! emitted, its trailing pieces (at most `chunk_overlap` characters) are
//! carried into the next one.
//!
//! All sizes are measured in `char`s, so multi-byte text is never cut inside a
//! code point. Output is deterministic for identical input and parameters.

use std::collections::VecDeque;

use anyhow::{ensure, Result};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, TextUnit};

/// Separators in order of preference. The empty separator means "any char".
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A chunk's position in its source text, in char offsets (`start..end`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be > 0");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS
                .iter()
                .map(|s| s.chars().collect())
                .collect(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Splits `text` into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|s| s.text).collect()
    }

    /// Splits `text` and reports where each chunk sits in the input.
    ///
    /// Chunks are whitespace-trimmed and never empty. Whitespace-only input
    /// yields no spans.
    pub fn split_spans(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        self.split_range(&chars, 0, chars.len(), 0)
            .into_iter()
            .filter_map(|(start, end)| trim_range(&chars, start, end))
            .map(|(start, end)| Span {
                start,
                end,
                text: chars[start..end].iter().collect(),
            })
            .collect()
    }

    fn split_range(&self, chars: &[char], start: usize, end: usize, level: usize) -> Vec<(usize, usize)> {
        // The last separator is empty and always applies, so this terminates.
        let level = (level..self.separators.len())
            .find(|&i| {
                let sep = &self.separators[i];
                sep.is_empty() || contains(&chars[start..end], sep)
            })
            .unwrap_or(self.separators.len() - 1);
        let sep = &self.separators[level];

        let mut out = Vec::new();
        let mut fitting = Vec::new();
        for (s, e) in split_inclusive(chars, start, end, sep) {
            if e - s <= self.chunk_size {
                fitting.push((s, e));
            } else {
                out.extend(self.merge(&fitting));
                fitting.clear();
                out.extend(self.split_range(chars, s, e, level + 1));
            }
        }
        out.extend(self.merge(&fitting));
        out
    }

    /// Greedily merges contiguous pieces (each at most `chunk_size` long).
    fn merge(&self, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(usize, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &(s, e) in pieces {
            let len = e - s;
            if total + len > self.chunk_size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    merged.push((first.0, last.1));
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((fs, fe)) => total -= fe - fs,
                        None => break,
                    }
                }
            }
            window.push_back((s, e));
            total += len;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            merged.push((first.0, last.1));
        }
        merged
    }
}

/// Splits `chars[start..end]` after every occurrence of `sep`, keeping the
/// separator on the preceding piece so pieces tile the range exactly.
fn split_inclusive(chars: &[char], start: usize, end: usize, sep: &[char]) -> Vec<(usize, usize)> {
    if sep.is_empty() {
        return (start..end).map(|i| (i, i + 1)).collect();
    }
    let mut pieces = Vec::new();
    let mut piece_start = start;
    let mut i = start;
    while i + sep.len() <= end {
        if chars[i..i + sep.len()] == *sep {
            i += sep.len();
            pieces.push((piece_start, i));
            piece_start = i;
        } else {
            i += 1;
        }
    }
    if piece_start < end {
        pieces.push((piece_start, end));
    }
    pieces
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn trim_range(chars: &[char], mut start: usize, mut end: usize) -> Option<(usize, usize)> {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    (start < end).then_some((start, end))
}

/// Chunks every unit of one document, numbering chunks contiguously from 0.
///
/// Each chunk inherits its unit's metadata, extended with `chunk_index` and
/// the chunk's char offset within the unit (`start_index`).
pub fn chunk_units(document_id: &str, units: &[TextUnit], splitter: &TextSplitter) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for unit in units {
        for span in splitter.split_spans(&unit.text) {
            let chunk_index = chunks.len() as i64;
            let mut metadata = unit.metadata.clone();
            if let Some(obj) = metadata.as_object_mut() {
                obj.insert("chunk_index".to_string(), chunk_index.into());
                obj.insert("start_index".to_string(), span.start.into());
            }
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                chunk_index,
                text: span.text,
                metadata,
            });
        }
    }
    chunks
}
