//! Wiring of the full ingest, retrieve and generate run.

use std::path::PathBuf;
use std::sync::Arc;

use ragline_core::config::{EmbeddingBackend, EmbeddingConfig, StoreBackend, StoreConfig};
use ragline_core::error::RagError;
use ragline_core::types::PipelineOutput;
use ragline_generate::{AnswerComposer, CompletionClient};
use ragline_pdf::DocumentLoader;
use ragline_vector::{
    CollectionSpec, DynEmbeddingService, EmbedderHandle, HashEmbedding, MemoryStore,
    OnnxEmbeddingService, RagPipeline, SqliteStore, StoreHandle, VectorStore,
};
use tracing::{info, warn};

/// Parameters of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub directory: PathBuf,
    pub query: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

/// Build the embedder handle for the configured backend.
pub fn build_embedder(config: &EmbeddingConfig, dimension: usize) -> EmbedderHandle {
    match config.backend {
        EmbeddingBackend::Onnx => {
            let model_dir = PathBuf::from(&config.model_dir);
            let model = config.model.clone();
            EmbedderHandle::new(dimension, move || {
                info!(model = %model, dir = %model_dir.display(), "Loading embedding model");
                let service = OnnxEmbeddingService::from_directory(&model_dir)?;
                Ok(Arc::new(service) as Arc<dyn DynEmbeddingService>)
            })
        }
        EmbeddingBackend::Hash => {
            warn!("Using hash embeddings; retrieval results carry no semantic meaning");
            EmbedderHandle::new(dimension, move || {
                Ok(Arc::new(HashEmbedding::new(dimension)) as Arc<dyn DynEmbeddingService>)
            })
        }
    }
}

/// Build the store handle for the configured backend.
pub fn build_store(config: &StoreConfig) -> StoreHandle {
    let spec = CollectionSpec::cosine(config.collection.clone(), config.dimension);
    match config.backend {
        StoreBackend::Sqlite => {
            let path = PathBuf::from(&config.path);
            StoreHandle::new(spec, move || {
                Ok(Arc::new(SqliteStore::open(&path)?) as Arc<dyn VectorStore>)
            })
        }
        StoreBackend::Memory => StoreHandle::new(spec, || {
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn VectorStore>)
        }),
    }
}

/// Ingest, retrieve and generate in sequence.
///
/// The store connection and embedding model are released before returning,
/// whether the run succeeded or not.
pub async fn run_pipeline<L, C>(
    pipeline: &RagPipeline<L>,
    composer: &AnswerComposer<C>,
    request: &RunRequest,
) -> Result<PipelineOutput, RagError>
where
    L: DocumentLoader,
    C: CompletionClient,
{
    let result = run_stages(pipeline, composer, request).await;
    pipeline.release();
    result
}

async fn run_stages<L, C>(
    pipeline: &RagPipeline<L>,
    composer: &AnswerComposer<C>,
    request: &RunRequest,
) -> Result<PipelineOutput, RagError>
where
    L: DocumentLoader,
    C: CompletionClient,
{
    let ingestion = pipeline
        .ingest(&request.directory, request.chunk_size, request.chunk_overlap)
        .await?;
    let retrieval = pipeline.retrieve(&request.query, request.top_k).await?;
    let generation = composer
        .compose(&request.query, &retrieval.contexts())
        .await?;

    Ok(PipelineOutput {
        ingestion,
        retrieval,
        generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::config::PointIdMode;
    use ragline_core::error::ErrorKind;
    use ragline_core::types::Document;
    use ragline_core::DirectoryAllowList;
    use ragline_generate::CompletionError;
    use ragline_pdf::StaticLoader;

    struct CannedCompletion(Option<&'static str>);

    impl CompletionClient for CannedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            match self.0 {
                Some(text) => Ok(text.to_string()),
                None => Err(CompletionError::Status {
                    status: 500,
                    body: "internal error".to_string(),
                }),
            }
        }
    }

    fn memory_config() -> StoreConfig {
        StoreConfig {
            backend: StoreBackend::Memory,
            path: String::new(),
            collection: "runner".to_string(),
            dimension: 16,
            point_ids: PointIdMode::Sequence,
        }
    }

    fn hash_config() -> EmbeddingConfig {
        EmbeddingConfig {
            backend: EmbeddingBackend::Hash,
            ..EmbeddingConfig::default()
        }
    }

    fn pipeline(root: &std::path::Path) -> RagPipeline<StaticLoader> {
        let docs = vec![Document::from_page_texts(
            "report.pdf",
            ["Revenue grew by ten percent.", "Costs were flat."],
        )];
        RagPipeline::new(
            StaticLoader::with_documents(docs),
            build_embedder(&hash_config(), 16),
            build_store(&memory_config()),
            DirectoryAllowList::new([root.to_string_lossy()]).unwrap(),
        )
    }

    fn request(directory: PathBuf) -> RunRequest {
        RunRequest {
            directory,
            query: "How did revenue change?".to_string(),
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 5,
        }
    }

    #[tokio::test]
    async fn test_full_run_releases_resources() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let composer = AnswerComposer::new(CannedCompletion(Some("It grew.")));

        let output = run_pipeline(&pipeline, &composer, &request(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(output.ingestion.status, "success");
        assert_eq!(output.ingestion.chunks_added, 2);
        assert_eq!(output.retrieval.len(), 2);
        assert_eq!(output.generation.response, "It grew.");
        assert_eq!(output.generation.query, "How did revenue change?");
        assert!(!pipeline.store().is_open());
        assert!(!pipeline.embedder().is_loaded());

        let json = serde_json::to_value(&output).unwrap();
        assert!(json["ingestion"]["chunks_added"].is_number());
        assert!(json["retrieval"]["results"].is_array());
        assert!(json["generation"]["response"].is_string());
    }

    #[tokio::test]
    async fn test_failed_ingest_releases_store() {
        let allowed = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let pipeline = pipeline(allowed.path());
        let composer = AnswerComposer::new(CannedCompletion(Some("unused")));

        let err = run_pipeline(&pipeline, &composer, &request(outside.path().to_path_buf()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!pipeline.store().is_open());
    }

    #[tokio::test]
    async fn test_failed_generation_releases_store() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let composer = AnswerComposer::new(CannedCompletion(None));

        let err = run_pipeline(&pipeline, &composer, &request(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(err.to_string().contains("How did revenue change?"));
        assert!(!pipeline.store().is_open());
        assert_eq!(pipeline.store().open_count(), 1);
    }

    #[test]
    fn test_build_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: dir.path().join("nested").join("vectors.db").to_string_lossy().to_string(),
            ..memory_config()
        };
        let handle = build_store(&config);
        let store = handle.ensure_collection().unwrap();
        assert!(store.collection_exists("runner").unwrap());
        assert!(dir.path().join("nested").join("vectors.db").exists());
        handle.release();
    }

    #[test]
    fn test_onnx_embedder_missing_model() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Onnx,
            model_dir: "/no/such/model".to_string(),
            ..EmbeddingConfig::default()
        };
        let handle = build_embedder(&config, 384);
        assert!(matches!(handle.acquire(), Err(RagError::Embedding(_))));
        assert!(!handle.is_loaded());
    }
}
