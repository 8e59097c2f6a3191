//! Deterministic chunk identifiers.

use ragline_core::types::{Chunk, PageChunk};

/// Format a chunk id as `"{source}:{page}:{index}"`.
pub fn format_chunk_id(source: &str, page: usize, index: usize) -> String {
    format!("{}:{}:{}", source, page, index)
}

/// Assign ids to chunks in processing order.
///
/// The index starts at 0, increments for each chunk sharing the previous
/// chunk's `(source, page)` and resets to 0 whenever that pair changes.
pub fn assign_chunk_ids(chunks: Vec<PageChunk>) -> Vec<Chunk> {
    let mut previous: Option<(String, usize)> = None;
    let mut index = 0usize;

    chunks
        .into_iter()
        .map(|chunk| {
            let same_page = previous
                .as_ref()
                .map(|(source, page)| *source == chunk.source && *page == chunk.page)
                .unwrap_or(false);
            index = if same_page { index + 1 } else { 0 };
            if !same_page {
                previous = Some((chunk.source.clone(), chunk.page));
            }

            Chunk {
                chunk_id: format_chunk_id(&chunk.source, chunk.page, index),
                text: chunk.text,
                source: chunk.source,
                page: chunk.page,
            }
        })
        .collect()
}
