//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits page text hierarchically (paragraphs, lines, sentences, words, then
//! characters) and merges the pieces back into overlapping chunks of at most
//! `chunk_size` characters.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::{DEFAULT_SEPARATORS, RagConfig};
use crate::document::{Chunk, ChunkMetadata, Page};

/// A strategy for splitting document text into chunks.
///
/// Implementations only need [`split_text`](Chunker::split_text); the default
/// [`split_pages`](Chunker::split_pages) attaches page provenance and the
/// document-wide `chunk_id` counter.
pub trait Chunker: Send + Sync {
    /// Split a single text into raw chunk strings.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split an ordered page stream into chunks.
    ///
    /// Chunks whose trimmed text is empty are dropped and do not consume a
    /// `chunk_id`. Ids start at 1 and keep counting across pages.
    fn split_pages(&self, pages: &[Page], source_file: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_id = 0u32;

        for page in pages {
            for raw in self.split_text(&page.text) {
                let text = raw.trim();
                if text.is_empty() {
                    continue;
                }
                chunk_id += 1;
                chunks.push(Chunk {
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        source_file: source_file.to_string(),
                        page: page.page,
                        chunk_id,
                        chunk_size: text.chars().count(),
                    },
                });
            }
        }

        info!(source_file, page_count = pages.len(), chunk_count = chunks.len(), "split pages");
        chunks
    }
}

/// Splits text recursively by an ordered list of separators.
///
/// The first separator present in the text is used to cut it into pieces;
/// each piece keeps its leading separator. Pieces shorter than `chunk_size`
/// are merged greedily into chunks, carrying up to `chunk_overlap` characters
/// of trailing pieces into the next chunk. Pieces that are still too long are
/// split again with the remaining separators. The empty separator splits into
/// single characters.
///
/// Lengths are counted in characters, not bytes.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 150);
/// let chunks = chunker.split_pages(&pages, "guide.pdf");
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separators.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a chunker from the chunking fields of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
            .with_separators(config.separators.clone())
    }

    /// Replace the separator list, most preferred first.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum chunk size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between consecutive chunks in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = choose_separator(text, separators);
        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge_pieces(&short_pieces));
                short_pieces.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge_pieces(&short_pieces));
        }

        chunks
    }

    /// Greedily merge pieces into chunks of at most `chunk_size` characters.
    ///
    /// When a chunk is emitted, pieces are dropped from its front until at
    /// most `chunk_overlap` characters remain and the next piece fits.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                if total > self.chunk_size {
                    debug!(total, chunk_size = self.chunk_size, "emitting oversized chunk");
                }
                push_joined(&mut chunks, &current);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }

            current.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &current);
        chunks
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.separators)
    }
}

/// Pick the first separator that occurs in `text`. The empty separator always
/// matches. Falls back to the last separator when none occurs.
fn choose_separator<'s>(text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator, &separators[i + 1..]);
        }
    }
    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

/// Split text at a separator while keeping the separator attached to the
/// start of the following piece. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Join pieces, trim, and keep the result if anything is left.
fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<&str>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, target_len: usize) -> String {
        let mut text = String::new();
        while text.len() + word.len() + 1 <= target_len {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
        text
    }

    #[test]
    fn keeps_separator_on_following_piece() {
        let pieces = split_keeping_separator("a\n\nb\n\nc", "\n\n");
        assert_eq!(pieces, vec!["a", "\n\nb", "\n\nc"]);
    }

    #[test]
    fn consecutive_separators_do_not_create_empty_pieces() {
        let pieces = split_keeping_separator("\n\na\n\n\n\nb", "\n\n");
        assert_eq!(pieces, vec!["\n\na", "\n\n", "\n\nb"]);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(500, 150);
        assert_eq!(chunker.split_text("  Kısa bir metin.  "), vec!["Kısa bir metin."]);
    }

    #[test]
    fn paragraphs_become_separate_chunks_when_they_do_not_fit_together() {
        let chunker = RecursiveChunker::new(500, 150);
        let p1 = paragraph("alpha", 400);
        let p2 = paragraph("beta", 400);
        let text = format!("{p1}\n\n{p2}");

        let chunks = chunker.split_text(&text);
        assert_eq!(chunks, vec![p1, p2]);
    }

    #[test]
    fn small_pieces_overlap_across_boundaries() {
        let chunker = RecursiveChunker::new(20, 8);
        let chunks = chunker.split_text("one two three four five six seven");
        assert!(chunks.len() > 1);
        for window in chunks.windows(2) {
            let last_word = window[0].split(' ').next_back().unwrap();
            assert!(window[1].contains(last_word), "{window:?} lost the overlap");
        }
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn long_word_falls_back_to_characters() {
        let chunker = RecursiveChunker::new(10, 2);
        let chunks = chunker.split_text(&"x".repeat(25));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks.concat().len() >= 25);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let chunker = RecursiveChunker::new(5, 0);
        let chunks = chunker.split_text("çğıöşü");
        assert_eq!(chunks, vec!["çğıöş", "ü"]);
    }

    #[test]
    fn chunk_ids_run_across_pages_and_skip_blank_pages() {
        let chunker = RecursiveChunker::new(500, 150);
        let pages =
            vec![Page::new(1, "Birinci sayfa."), Page::new(2, "   \n  "), Page::new(3, "Üçüncü.")];

        let chunks = chunker.split_pages(&pages, "rapor.pdf");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.chunk_id, 1);
        assert_eq!(chunks[0].metadata.page, 1);
        assert_eq!(chunks[1].metadata.chunk_id, 2);
        assert_eq!(chunks[1].metadata.page, 3);
        assert_eq!(chunks[1].metadata.chunk_size, "Üçüncü.".chars().count());
        assert_eq!(chunks[1].metadata.source_file, "rapor.pdf");
    }
}
