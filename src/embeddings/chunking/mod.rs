
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, DocumentMetadata};

/// Separators tried, in order of preference, when choosing where a chunk ends
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// Represents a chunk of a page ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, an exact substring of the page
    pub text: String,
    /// Source file and page the chunk was cut from
    pub metadata: DocumentMetadata,
    /// The index of this chunk within the page
    pub chunk_index: usize,
    /// Character offset of the chunk within the page text
    pub start: usize,
    /// Estimated token count
    pub token_count: usize,
}

impl Chunk {
    /// Whether the chunk holds nothing but whitespace
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A slice of text produced by [`split_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Character offset of the span
    pub start: usize,
    pub text: String,
}

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 100,
        }
    }
}

/// Split `text` into overlapping spans of at most `chunk_size` characters.
///
/// Consecutive spans share exactly `overlap` characters. Each span prefers to
/// end after a paragraph break, then a line break, then a space, as long as it
/// still covers at least half of `chunk_size`.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<TextSpan> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut spans = Vec::new();

    if len == 0 {
        return spans;
    }

    let size = config.chunk_size.max(1);
    let overlap = config.overlap.min(size / 2);
    let min_advance = (size / 2).max(overlap + 1);

    let mut start = 0;
    loop {
        let hard_end = (start + size).min(len);
        let end = if hard_end == len {
            len
        } else {
            find_split_point(&chars, start + min_advance, hard_end)
        };

        spans.push(TextSpan {
            start,
            text: chars[start..end].iter().collect(),
        });

        if end == len {
            break;
        }
        // end - overlap > start because end >= start + overlap + 1
        start = end - overlap;
    }

    spans
}

/// Last position in `min_end..=hard_end` directly after a preferred separator
fn find_split_point(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    for separator in SEPARATORS {
        let sep_len = separator.len();
        let found = (min_end..=hard_end)
            .rev()
            .find(|&end| end >= sep_len && chars[end - sep_len..end] == *separator);

        if let Some(end) = found {
            return end;
        }
    }

    hard_end
}

/// Chunk every page, carrying its source metadata.
///
/// Every span is kept, including whitespace-only ones, so [`reassemble`] can
/// rebuild each page exactly. Use [`Chunk::is_blank`] to skip them when embedding.
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for document in documents {
        let page_chunks = split_text(&document.text, config)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| Chunk {
                token_count: estimate_token_count(&span.text),
                text: span.text,
                metadata: document.metadata.clone(),
                chunk_index,
                start: span.start,
            });
        chunks.extend(page_chunks);
    }

    debug!(
        "Chunked {} pages into {} chunks (avg {} tokens)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Rebuild page text from its chunks, dropping the overlap between neighbours.
///
/// `chunks` must all come from the same page and be in order.
#[inline]
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.start + chunk.text.chars().count());
    }

    text
}

/// Estimate the number of tokens in text
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
