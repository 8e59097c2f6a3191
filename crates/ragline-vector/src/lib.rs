//! Ragline vector crate - chunking, embedding, vector storage and the
//! ingestion/retrieval pipeline.
//!
//! Provides a recursive text chunker with deterministic chunk ids, an
//! embedding service trait with ONNX and hash-based implementations, a
//! vector store trait with in-memory and SQLite backends, managed handles
//! for both resources, and the pipeline that ties them together.

pub mod chunk_id;
pub mod chunker;
pub mod embedding;
pub mod handle;
pub mod pipeline;
pub mod sqlite_store;
pub mod store;

pub use chunk_id::{assign_chunk_ids, format_chunk_id};
pub use chunker::TextChunker;
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding, OnnxEmbeddingService};
pub use handle::{CollectionSpec, EmbedderHandle, StoreHandle};
pub use pipeline::{RagPipeline, QUERY_LOG_TARGET};
pub use sqlite_store::SqliteStore;
pub use store::{Distance, MemoryStore, PointId, ScoredPoint, VectorRecord, VectorStore};
