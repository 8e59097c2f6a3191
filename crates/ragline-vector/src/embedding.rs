//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` runs a sentence-transformer ONNX export (e.g.
//!   all-MiniLM-L6-v2) through ort and tokenizes with the HuggingFace
//!   tokenizers crate. This is the production embedding backend.
//! - `HashEmbedding` produces deterministic hash-based vectors of any
//!   dimension, for offline runs and tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::value::TensorRef;
use ragline_core::error::RagError;
use sha2::{Digest, Sha256};
use tokenizers::Tokenizer;
use tracing::info;

/// Service for generating text embeddings.
///
/// Implementations must be deterministic: identical text under an identical
/// model configuration yields an identical vector.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, RagError>> + Send;

    /// Embed several texts, in order. Stops at the first failure.
    fn embed_batch(
        &self,
        texts: &[&str],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Boxed future returned by [`DynEmbeddingService::embed_boxed`].
pub type EmbedFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>>;

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and so cannot be used as a
/// trait object. Every `EmbeddingService` implements this trait through the
/// blanket impl below, which lets [`crate::handle::EmbedderHandle`] hold any
/// backend behind an `Arc<dyn DynEmbeddingService>`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// Average token embeddings over positions whose attention mask is set.
///
/// `token_embeddings` is the flattened `[seq_len, hidden_dim]` output for a
/// single input.
pub fn mean_pool(token_embeddings: &[f32], attention_mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (token, &mask) in attention_mask.iter().enumerate() {
        if mask == 0 {
            continue;
        }
        let offset = token * hidden_dim;
        let Some(row) = token_embeddings.get(offset..offset + hidden_dim) else {
            break;
        };
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
        count += 1.0;
    }

    if count > 0.0 {
        for v in &mut pooled {
            *v /= count;
        }
    }
    pooled
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed embedding service using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`: the sentence-transformer ONNX export
/// - `tokenizer.json`: the HuggingFace fast-tokenizer file
///
/// The model takes `input_ids`, `attention_mask` and `token_type_ids` and
/// produces token-level embeddings; masked mean pooling followed by L2
/// normalisation yields one vector per input.
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load a sentence-transformer model from the given directory.
    pub fn from_directory(model_dir: &Path) -> Result<Self, RagError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, RagError> {
        if !model_path.exists() {
            return Err(RagError::Embedding(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(RagError::Embedding(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| RagError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| RagError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Embedding(format!("ONNX load model: {}", e)))?;

        // Output is [batch, seq_len, hidden_dim]; a dynamic hidden dim falls back to 384.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 384 })
            .unwrap_or(384);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
        })
    }
}

fn run_inference(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    text: &str,
) -> Result<Vec<f32>, RagError> {
    if text.is_empty() {
        return Err(RagError::Embedding("Cannot embed empty text".to_string()));
    }

    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| RagError::Embedding(format!("Tokenization failed: {}", e)))?;

    let to_i64 = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<i64>>();
    let input_ids = to_i64(encoding.get_ids());
    let attention_mask = to_i64(encoding.get_attention_mask());
    let token_type_ids = to_i64(encoding.get_type_ids());
    let seq_len = input_ids.len();

    let as_batch = |values: Vec<i64>, name: &str| {
        ndarray::Array2::from_shape_vec((1, seq_len), values)
            .map_err(|e| RagError::Embedding(format!("{} array: {}", name, e)))
    };
    let ids_array = as_batch(input_ids, "input_ids")?;
    let mask_array = as_batch(attention_mask.clone(), "attention_mask")?;
    let type_array = as_batch(token_type_ids, "token_type_ids")?;

    let ids_ref = TensorRef::from_array_view(&ids_array)
        .map_err(|e| RagError::Embedding(format!("TensorRef input_ids: {}", e)))?;
    let mask_ref = TensorRef::from_array_view(&mask_array)
        .map_err(|e| RagError::Embedding(format!("TensorRef attention_mask: {}", e)))?;
    let type_ref = TensorRef::from_array_view(&type_array)
        .map_err(|e| RagError::Embedding(format!("TensorRef token_type_ids: {}", e)))?;

    let mut session = session
        .lock()
        .map_err(|e| RagError::Embedding(format!("Session lock poisoned: {}", e)))?;
    let outputs = session
        .run(ort::inputs![ids_ref, mask_ref, type_ref])
        .map_err(|e| RagError::Embedding(format!("ONNX inference failed: {}", e)))?;

    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| RagError::Embedding(format!("Extract embeddings: {}", e)))?;

    let shape_dims: Vec<i64> = shape.iter().copied().collect();
    let hidden_dim = match shape_dims.as_slice() {
        [_, .., last] if *last > 0 => *last as usize,
        _ => {
            return Err(RagError::Embedding(format!(
                "Unexpected output shape: {:?}",
                shape_dims
            )))
        }
    };

    let mut pooled = mean_pool(data, &attention_mask, hidden_dim);
    l2_normalize(&mut pooled);
    Ok(pooled)
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        // Inference is CPU-bound; run it on a blocking thread and wait for it.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || run_inference(&session, &tokenizer, &text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Embedding service that derives unit vectors from a hash of the input.
///
/// Identical inputs always produce identical outputs, so ingestion and
/// retrieval can be exercised end to end without a model on disk. Values are
/// derived from SHA-256 and stay the same across builds, so a persisted
/// collection keeps matching. Vectors carry no semantic meaning.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Each SHA-256 block of `text ++ block_index` yields eight components.
    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result: Vec<f32> = Vec::with_capacity(self.dimensions);
        let mut block: u64 = 0;
        while result.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();

            let wanted = self.dimensions - result.len();
            for word in digest.chunks_exact(4).take(wanted) {
                let h = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                result.push((((h as f64) / (u32::MAX as f64)) * 2.0 - 1.0) as f32);
            }
            block += 1;
        }
        l2_normalize(&mut result);
        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if text.is_empty() {
            return Err(RagError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
