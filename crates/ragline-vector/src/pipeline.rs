//! Ragline ingestion and retrieval pipeline.
//!
//! Ingestion turns an allow-listed directory of documents into embedded
//! chunks in the vector store; retrieval embeds a query and returns the
//! nearest chunks. Every stage runs to completion before the next starts.

use std::path::Path;

use ragline_core::allowlist::DirectoryAllowList;
use ragline_core::config::PointIdMode;
use ragline_core::error::RagError;
use ragline_core::types::{
    Chunk, ChunkPayload, IngestReport, QueryResult, RetrievalResponse,
};
use ragline_pdf::DocumentLoader;
use tracing::{debug, error, info};

use crate::chunk_id::assign_chunk_ids;
use crate::chunker::TextChunker;
use crate::handle::{EmbedderHandle, StoreHandle};
use crate::store::{PointId, VectorRecord};

/// Tracing target of the per-query audit events emitted by retrieval.
pub const QUERY_LOG_TARGET: &str = "ragline::query_log";

/// The ingestion and retrieval pipeline over injected resource handles.
pub struct RagPipeline<L: DocumentLoader> {
    loader: L,
    embedder: EmbedderHandle,
    store: StoreHandle,
    allow_list: DirectoryAllowList,
    point_ids: PointIdMode,
}

impl<L: DocumentLoader> RagPipeline<L> {
    pub fn new(
        loader: L,
        embedder: EmbedderHandle,
        store: StoreHandle,
        allow_list: DirectoryAllowList,
    ) -> Self {
        Self {
            loader,
            embedder,
            store,
            allow_list,
            point_ids: PointIdMode::Sequence,
        }
    }

    /// Choose how point ids are assigned on upsert.
    pub fn with_point_ids(mut self, point_ids: PointIdMode) -> Self {
        self.point_ids = point_ids;
        self
    }

    pub fn embedder(&self) -> &EmbedderHandle {
        &self.embedder
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn allow_list(&self) -> &DirectoryAllowList {
        &self.allow_list
    }

    /// Release the store connection and the embedding model.
    pub fn release(&self) {
        self.store.release();
        self.embedder.release();
    }

    /// Ingest every document in `directory`.
    pub async fn ingest(
        &self,
        directory: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestReport, RagError> {
        let shown = directory.display().to_string();
        match self.ingest_inner(directory, &shown, chunk_size, chunk_overlap).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(directory = %shown, error = %e, "Ingestion failed");
                Err(e.context(format!("ingestion failed for {}", shown)))
            }
        }
    }

    async fn ingest_inner(
        &self,
        directory: &Path,
        shown: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestReport, RagError> {
        let chunker = TextChunker::new(chunk_size, chunk_overlap)?;
        self.allow_list.check(directory)?;

        let store = self.store.ensure_collection()?;

        // Sources keep the directory as the caller spelled it.
        let mut documents = self.loader.load(directory).await?;
        documents.sort_by(|a, b| a.source.cmp(&b.source));
        for doc in &mut documents {
            doc.pages.sort_by_key(|p| p.page);
        }

        let page_count: usize = documents.iter().map(|d| d.page_count()).sum();
        let chunks = assign_chunk_ids(chunker.chunk_documents(&documents));
        if chunks.is_empty() {
            return Err(RagError::Extraction {
                path: shown.to_string(),
                reason: if page_count == 0 {
                    "no extractable text: no pages found".to_string()
                } else {
                    "no extractable text: all pages are blank".to_string()
                },
            });
        }
        info!(
            directory = %shown,
            documents = documents.len(),
            pages = page_count,
            chunks = chunks.len(),
            "Documents chunked"
        );

        let records = self.embed_chunks(&chunks).await?;
        let collection = &self.store.collection().name;
        let written = store.upsert(collection, records)?;

        info!(directory = %shown, chunks = written, collection = %collection, "Ingestion complete");
        Ok(IngestReport::success(shown, written))
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<VectorRecord>, RagError> {
        let mut records = Vec::with_capacity(chunks.len());
        for (seq, chunk) in chunks.iter().enumerate() {
            let vector = self.embedder.embed(&chunk.text).await.map_err(|e| {
                error!(chunk_id = %chunk.chunk_id, error = %e, "Chunk embedding failed");
                e.context(format!("chunk {}", chunk.chunk_id))
            })?;

            let id = match self.point_ids {
                PointIdMode::Sequence => PointId::Sequence(seq as u64),
                PointIdMode::ChunkId => PointId::from_chunk_id(&chunk.chunk_id),
            };
            records.push(VectorRecord {
                id,
                vector,
                payload: ChunkPayload::from(chunk),
            });
        }
        debug!(records = records.len(), "Chunks embedded");
        Ok(records)
    }

    /// Return up to `top_k` chunks most similar to `query`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResponse, RagError> {
        match self.retrieve_inner(query, top_k).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(target: QUERY_LOG_TARGET, query = %query, error = %e, "Retrieval failed");
                Err(e.context(format!("retrieval failed for query '{}'", query)))
            }
        }
    }

    async fn retrieve_inner(&self, query: &str, top_k: usize) -> Result<RetrievalResponse, RagError> {
        if top_k == 0 {
            return Err(RagError::Validation(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }

        info!(target: QUERY_LOG_TARGET, query = %query, top_k, "Querying");
        let vector = self.embedder.embed(query).await?;
        let store = self.store.ensure_collection()?;
        let hits = store.query(&self.store.collection().name, &vector, top_k)?;

        let results: Vec<QueryResult> = hits
            .into_iter()
            .map(|hit| QueryResult {
                text: hit.payload.text,
                source: hit.payload.source,
                chunk_id: hit.payload.chunk_id,
                score: hit.score,
            })
            .collect();

        info!(
            target: QUERY_LOG_TARGET,
            query = %query,
            results = results.len(),
            "Retrieved chunks"
        );
        Ok(RetrievalResponse { results })
    }
}
