//! Character-based text splitter with overlapping windows.
//!
//! Cut points prefer paragraph breaks, then line breaks, then spaces, and
//! fall back to a hard cut. Every chunk is an exact substring of the source,
//! and chunk `i + 1` starts `overlap` characters before chunk `i` ends, so
//! dropping the first `overlap` characters of every chunk after the first and
//! concatenating reproduces the source text.

use serde_json::Value;
use tracing::debug;

use docent_core::error::{DocentError, Result};
use docent_core::types::{Chunk, Metadata, SourceDocument};

/// Separators tried in priority order before falling back to a hard cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Splits text into overlapping chunks of at most `chunk_size` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Sizes are counted in Unicode scalar values.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocentError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(DocentError::InvalidConfiguration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks tagged with `source_id` and `base` metadata.
    pub fn split(&self, source_id: &str, text: &str, base: &Metadata) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let spans = self.spans(&chars);

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let mut metadata = base.clone();
                metadata.insert("chunk_index".to_string(), Value::from(index));
                metadata.insert("start_char".to_string(), Value::from(start));
                metadata.insert("end_char".to_string(), Value::from(end));
                let body: String = chars[start..end].iter().collect();
                Chunk::new(body, source_id, metadata)
            })
            .collect();

        debug!(
            source_id,
            chars = chars.len(),
            chunks = chunks.len(),
            "Split source text"
        );
        chunks
    }

    /// Split a loaded document, carrying its metadata onto every chunk.
    pub fn split_document(&self, document: &SourceDocument) -> Vec<Chunk> {
        self.split(&document.source_id, &document.text, &document.metadata)
    }

    /// Compute `[start, end)` character spans for every chunk.
    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            if total - start <= self.chunk_size {
                spans.push((start, total));
                break;
            }

            let window_end = start + self.chunk_size;
            // Any accepted cut leaves the chunk longer than `overlap`, so the
            // next start always moves forward.
            let min_end = start + self.overlap + 1;
            let end = SEPARATORS
                .iter()
                .find_map(|sep| last_boundary(chars, start, min_end, window_end, sep))
                .unwrap_or(window_end);

            spans.push((start, end));
            start = end - self.overlap;
        }

        spans
    }
}

/// Find the largest `end` in `[min_end, window_end]` such that `sep` ends
/// exactly at `end` and starts at or after `start`.
fn last_boundary(
    chars: &[char],
    start: usize,
    min_end: usize,
    window_end: usize,
    sep: &str,
) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    (min_end..=window_end).rev().find(|&end| {
        end >= start + sep.len() && chars[end - sep.len()..end] == sep[..]
    })
}

/// Convenience wrapper: validate the parameters and split `text` in one call.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(chunk_size, overlap)?;
    Ok(chunker.split("", text, &Metadata::new()))
}
