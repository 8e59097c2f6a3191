//! Recursive character text splitter.
//!
//! Text is split on the coarsest separator present (paragraph, line,
//! sentence, word, character), oversized pieces are split again with the
//! finer separators, and the pieces are merged back into chunks of at most
//! `chunk_size` characters with up to `chunk_overlap` characters carried over
//! between neighbours. Chunks are always contiguous slices of the page text.

use std::collections::VecDeque;

use ragline_core::error::RagError;
use ragline_core::types::{Document, Page, PageChunk};
use tracing::debug;

/// Separators tried in order. The empty separator splits into characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A byte range of the page text and its length in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    chars: usize,
}

impl Span {
    fn of(text: &str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            chars: text[start..end].chars().count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextChunker {
    /// Create a chunker. Sizes are measured in characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS)
    }

    pub fn with_separators<I, S>(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: I,
    ) -> Result<Self, RagError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if chunk_size == 0 {
            return Err(RagError::Validation(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let mut separators: Vec<String> = separators.into_iter().map(Into::into).collect();
        // The character split is always the last resort.
        if separators.last().map(|s| !s.is_empty()).unwrap_or(true) {
            separators.push(String::new());
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into `(byte_offset, chunk_text)` pairs.
    ///
    /// Whitespace-only chunks are dropped, so consecutive chunks may be
    /// separated by a run of whitespace.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut spans = Vec::new();
        self.split_span(text, Span::of(text, 0, text.len()), &self.separators, &mut spans);
        spans
            .into_iter()
            .map(|span| (span.start, &text[span.start..span.end]))
            .filter(|(_, chunk)| !chunk.trim().is_empty())
            .collect()
    }

    /// Chunk one page. Blank pages produce no chunks.
    pub fn chunk_page(&self, page: &Page) -> Vec<PageChunk> {
        self.split_text(&page.text)
            .into_iter()
            .map(|(start, text)| PageChunk {
                text: text.to_string(),
                source: page.source.clone(),
                page: page.page,
                start,
            })
            .collect()
    }

    /// Chunk every page of every document, in the order given.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<PageChunk> {
        let chunks: Vec<PageChunk> = documents
            .iter()
            .flat_map(|doc| doc.pages.iter())
            .flat_map(|page| self.chunk_page(page))
            .collect();
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "Chunked documents"
        );
        chunks
    }

    fn split_span(&self, text: &str, span: Span, separators: &[String], out: &mut Vec<Span>) {
        let slice = &text[span.start..span.end];
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || slice.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut fitting: Vec<Span> = Vec::new();
        for piece in split_keeping_separator(text, span, separator) {
            if piece.chars <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            self.merge(&fitting, out);
            fitting.clear();
            if finer.is_empty() {
                out.push(piece);
            } else {
                self.split_span(text, piece, finer, out);
            }
        }
        self.merge(&fitting, out);
    }

    /// Greedily merge adjacent pieces into chunks, keeping up to
    /// `chunk_overlap` trailing characters as the head of the next chunk.
    fn merge(&self, pieces: &[Span], out: &mut Vec<Span>) {
        let mut window: VecDeque<Span> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            if total + piece.chars > self.chunk_size {
                if let Some(span) = window_span(&window, total) {
                    out.push(span);
                }
                while total > self.chunk_overlap
                    || (total + piece.chars > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }
            window.push_back(*piece);
            total += piece.chars;
        }

        if let Some(span) = window_span(&window, total) {
            out.push(span);
        }
    }
}

fn window_span(window: &VecDeque<Span>, total: usize) -> Option<Span> {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => Some(Span {
            start: first.start,
            end: last.end,
            chars: total,
        }),
        _ => None,
    }
}

/// Split `span` after every occurrence of `separator`. Each piece keeps its
/// trailing separator; an empty separator yields single characters.
fn split_keeping_separator(text: &str, span: Span, separator: &str) -> Vec<Span> {
    let slice = &text[span.start..span.end];

    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(offset, ch)| Span {
                start: span.start + offset,
                end: span.start + offset + ch.len_utf8(),
                chars: 1,
            })
            .collect();
    }

    let mut pieces = Vec::new();
    let mut cursor = 0;
    for (offset, matched) in slice.match_indices(separator) {
        let end = offset + matched.len();
        if end > cursor {
            pieces.push(Span::of(text, span.start + cursor, span.start + end));
            cursor = end;
        }
    }
    if cursor < slice.len() {
        pieces.push(Span::of(text, span.start + cursor, span.end));
    }
    pieces
}
