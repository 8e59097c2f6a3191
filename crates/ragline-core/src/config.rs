use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};

/// Top-level configuration for Ragline.
///
/// Loaded from `~/.ragline/config.toml` by default, then overridden by
/// `RAGLINE_*` environment variables and finally by CLI arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaglineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl RaglineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RaglineConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `RAGLINE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Blank values are ignored. A dimension that is not a positive integer is
    /// reported as a validation error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RAGLINE_STORE_PATH") {
            self.store.path = v;
        }
        if let Some(v) = get("RAGLINE_COLLECTION") {
            self.store.collection = v;
        }
        if let Some(v) = get("RAGLINE_VECTOR_DIMENSION") {
            self.store.dimension = v.trim().parse::<usize>().map_err(|_| {
                RagError::Validation(format!(
                    "RAGLINE_VECTOR_DIMENSION must be a positive integer, got '{}'",
                    v
                ))
            })?;
        }
        if let Some(v) = get("RAGLINE_ALLOWED_DIRECTORIES") {
            self.ingest.allowed_directories = v
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(v) = get("RAGLINE_OLLAMA_URL") {
            self.generation.url = v;
        }
        if let Some(v) = get("RAGLINE_OLLAMA_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("RAGLINE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("RAGLINE_EMBEDDING_MODEL_DIR") {
            self.embedding.model_dir = v;
        }
        if let Some(v) = get("RAGLINE_QUERY_LOG") {
            self.retrieval.query_log = v;
        }
        Ok(())
    }

    /// Check that every setting is usable. Startup aborts on failure.
    pub fn validate(&self) -> Result<()> {
        fn require(value: &str, name: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(RagError::Validation(format!("{} is not set", name)));
            }
            Ok(())
        }

        require(&self.store.path, "store.path")?;
        require(&self.store.collection, "store.collection")?;
        if self.store.dimension == 0 {
            return Err(RagError::Validation(
                "store.dimension must be positive".to_string(),
            ));
        }
        if self.ingest.allowed_directories.is_empty()
            || self
                .ingest
                .allowed_directories
                .iter()
                .all(|d| d.trim().is_empty())
        {
            return Err(RagError::Validation(
                "ingest.allowed_directories is empty".to_string(),
            ));
        }
        if self.ingest.chunk_size == 0 {
            return Err(RagError::Validation(
                "ingest.chunk_size must be positive".to_string(),
            ));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(RagError::Validation(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Validation(
                "retrieval.top_k must be positive".to_string(),
            ));
        }
        require(&self.embedding.model, "embedding.model")?;
        if self.embedding.backend == EmbeddingBackend::Onnx {
            require(&self.embedding.model_dir, "embedding.model_dir")?;
        }
        require(&self.generation.url, "generation.url")?;
        if !self.generation.url.starts_with("http://") && !self.generation.url.starts_with("https://")
        {
            return Err(RagError::Validation(format!(
                "generation.url must be an http(s) URL, got '{}'",
                self.generation.url
            )));
        }
        require(&self.generation.model, "generation.model")?;
        if self.generation.timeout_secs == 0 {
            return Err(RagError::Validation(
                "generation.timeout_secs must be positive".to_string(),
            ));
        }

        info!("Configuration validated successfully");
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// File-backed SQLite collection at `store.path`.
    Sqlite,
    /// Process-local collection, lost on exit.
    Memory,
}

/// How point identifiers are derived on upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointIdMode {
    /// Batch-local counter; re-ingesting a directory appends a new batch.
    Sequence,
    /// UUIDv5 of the chunk id; re-ingesting a directory overwrites.
    ChunkId,
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the SQLite backend.
    pub path: String,
    /// Collection name.
    pub collection: String,
    /// Vector dimensionality `D` shared by every record.
    pub dimension: usize,
    pub point_ids: PointIdMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "rag_data/vectors.db".to_string(),
            collection: "rag_pdfs".to_string(),
            dimension: 384,
            point_ids: PointIdMode::Sequence,
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directories that ingestion may read from (and their descendants).
    pub allowed_directories: Vec<String>,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_directories: vec!["./data".to_string(), "/app/data".to_string()],
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of passages to retrieve.
    pub top_k: usize,
    /// File that every query is appended to. Empty disables the query log.
    pub query_log: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            query_log: "query_log.txt".to_string(),
        }
    }
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Sentence-transformer ONNX export run through ONNX Runtime.
    Onnx,
    /// Deterministic hash vectors; no model required.
    Hash,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Embedding model name (informational for the ONNX backend).
    pub model: String,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model: "all-MiniLM-L6-v2".to_string(),
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Completion endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Ollama-compatible `/api/generate` URL.
    pub url: String,
    pub model: String,
    /// Upper bound on a single completion request.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 30,
        }
    }
}
