use serde::{Deserialize, Serialize};

// =============================================================================
// Documents
// =============================================================================

/// One page of extracted document text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Source document identifier (file path).
    pub source: String,
    /// Zero-based page index within the source document.
    pub page: usize,
    /// Extracted text of the page.
    pub text: String,
}

/// An extracted document: an ordered sequence of pages from one source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from raw page texts, numbering pages from zero.
    pub fn from_page_texts<I, S>(source: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = source.into();
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(page, text)| Page {
                source: source.clone(),
                page,
                text: text.into(),
            })
            .collect();
        Self { source, pages }
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// A chunk as produced by the chunker, before identification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageChunk {
    pub text: String,
    pub source: String,
    pub page: usize,
    /// Byte offset of the chunk inside its page text.
    pub start: usize,
}

/// An identified chunk ready for embedding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub page: usize,
    /// Deterministic `"{source}:{page}:{index}"` key.
    pub chunk_id: String,
}

/// Payload persisted alongside every vector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub source: String,
    pub chunk_id: String,
}

impl From<&Chunk> for ChunkPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            chunk_id: chunk.chunk_id.clone(),
        }
    }
}

// =============================================================================
// Pipeline results
// =============================================================================

/// Outcome of a successful ingestion run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Always `"success"`; failures are reported as errors instead.
    pub status: String,
    pub chunks_added: usize,
    pub directory: String,
}

impl IngestReport {
    pub fn success(directory: impl Into<String>, chunks_added: usize) -> Self {
        Self {
            status: "success".to_string(),
            chunks_added,
            directory: directory.into(),
        }
    }
}

/// A single retrieved passage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    pub source: String,
    pub chunk_id: String,
    /// Cosine similarity in [-1, 1]; higher is more relevant.
    pub score: f64,
}

/// Retrieval output, ordered by descending score.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<QueryResult>,
}

impl RetrievalResponse {
    /// Passage texts in retrieval order.
    pub fn contexts(&self) -> Vec<String> {
        self.results.iter().map(|r| r.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A model answer paired with the query that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub query: String,
    pub response: String,
}

/// Combined result of a full ingest → retrieve → generate run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub ingestion: IngestReport,
    pub retrieval: RetrievalResponse,
    pub generation: Generation,
}
