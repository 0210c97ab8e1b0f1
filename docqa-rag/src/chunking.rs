//! Document chunking.
//!
//! [`RecursiveChunker`] splits text at decreasing granularity (paragraphs,
//! lines, sentences, words, then single characters) and merges the pieces
//! back into chunks of at most `chunk_size` characters. Every chunk after the
//! first starts with the last `chunk_overlap` characters of its predecessor,
//! so each chunk is a contiguous span of the source text.

use std::ops::Range;

use crate::document::{Chunk, Document};

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations return an empty `Vec` for documents with no text.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// A chunk of text borrowed from its source, with its character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    pub text: &'a str,
    /// Offset of `text` in the source, in characters.
    pub start_index: usize,
}

/// Splits text hierarchically and merges the pieces with a fixed character overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk
/// inherits the parent document's metadata plus `chunk_index` and
/// `start_index` fields.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(400, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(400, 50)
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        split_text(&document.text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, span)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), i.to_string());
                metadata.insert("start_index".to_string(), span.start_index.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id),
                    content: span.text.to_string(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

/// Split `text` into chunks of at most `chunk_size` characters where each
/// chunk after the first begins with the last `chunk_overlap` characters of
/// the previous one.
///
/// Leading and trailing whitespace is dropped before splitting; offsets still
/// refer to the untrimmed text. Text no longer than `chunk_size` comes back
/// as a single chunk. Blank text yields no chunks. An overlap of `chunk_size`
/// or more is clamped to `chunk_size - 1`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextSpan<'_>> {
    let body = text.trim();
    if chunk_size == 0 || body.is_empty() {
        return Vec::new();
    }
    let lead = char_len(&text[..text.len() - text.trim_start().len()]);
    if char_len(body) <= chunk_size {
        return vec![TextSpan { text: body, start_index: lead }];
    }

    let overlap = chunk_overlap.min(chunk_size - 1);
    let mut pieces = Vec::new();
    split_pieces(body, 0..body.len(), chunk_size - overlap, &SEPARATORS, &mut pieces);

    let mut spans = Vec::new();
    let (mut byte_cursor, mut char_cursor) = (0, lead);
    for range in merge_pieces(body, &pieces, chunk_size, overlap) {
        char_cursor += char_len(&body[byte_cursor..range.start]);
        byte_cursor = range.start;
        spans.push(TextSpan { text: &body[range], start_index: char_cursor });
    }
    spans
}

/// Recursively cut `range` into pieces of at most `limit` characters.
fn split_pieces(
    text: &str,
    range: Range<usize>,
    limit: usize,
    separators: &[&str],
    out: &mut Vec<Range<usize>>,
) {
    let slice = &text[range.clone()];
    if char_len(slice) <= limit {
        out.push(range);
        return;
    }

    match separators.split_first() {
        Some((separator, rest)) => {
            for segment in split_keeping_separator(slice, separator) {
                let segment = (range.start + segment.start)..(range.start + segment.end);
                split_pieces(text, segment, limit, rest, out);
            }
        }
        None => split_by_chars(slice, range.start, limit, out),
    }
}

/// Split at a separator, keeping the separator attached to the preceding segment.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<Range<usize>> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(start..end);
        start = end;
    }

    if start < text.len() {
        result.push(start..text.len());
    }

    result
}

fn split_by_chars(text: &str, offset: usize, limit: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == limit {
            out.push(offset + start..offset + i);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(offset + start..offset + text.len());
    }
}

/// Greedily merge contiguous pieces into chunks of at most `chunk_size`
/// characters, seeding each new chunk with the tail of the previous one.
///
/// Every piece is at most `chunk_size - overlap` characters, so a flushed
/// chunk is always longer than `overlap` and the seeded tail plus the next
/// piece always fits.
fn merge_pieces(
    text: &str,
    pieces: &[Range<usize>],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Range<usize>> {
    let mut chunks = Vec::new();
    let (mut start, mut end, mut len) = (0, 0, 0);

    for piece in pieces {
        let piece_len = char_len(&text[piece.clone()]);
        if end > start && len + piece_len > chunk_size {
            chunks.push(start..end);
            start = back_chars(text, end, overlap);
            len = char_len(&text[start..end]);
        }
        end = piece.end;
        len += piece_len;
    }

    if end > start {
        chunks.push(start..end);
    }
    chunks
}

/// Byte index `n` characters before `end`.
fn back_chars(text: &str, end: usize, n: usize) -> usize {
    if n == 0 {
        return end;
    }
    text[..end].char_indices().rev().nth(n - 1).map(|(i, _)| i).unwrap_or(0)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
