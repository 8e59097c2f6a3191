//! Managed handles for the embedding model and the vector store.
//!
//! Both resources are expensive to open, so they are acquired lazily on first
//! use and cached. A handle can be invalidated, which drops the cached
//! instance so that the next use reacquires it, or released, which also
//! closes the underlying resource.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ragline_core::error::RagError;
use tracing::{debug, info, warn};

use crate::embedding::DynEmbeddingService;
use crate::store::{Distance, VectorStore};

type EmbedderLoader = dyn Fn() -> Result<Arc<dyn DynEmbeddingService>, RagError> + Send + Sync;
type StoreOpener = dyn Fn() -> Result<Arc<dyn VectorStore>, RagError> + Send + Sync;

fn lock_slot<T>(slot: &Mutex<Option<T>>) -> MutexGuard<'_, Option<T>> {
    // A panic while holding the lock leaves the slot itself consistent.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// EmbedderHandle
// ---------------------------------------------------------------------------

/// Lazily loaded embedding model.
///
/// The handle checks that the loaded model produces vectors of the expected
/// dimension, and drops the model after any embedding failure.
pub struct EmbedderHandle {
    expected_dimension: usize,
    loader: Box<EmbedderLoader>,
    slot: Mutex<Option<Arc<dyn DynEmbeddingService>>>,
    loads: AtomicUsize,
}

impl std::fmt::Debug for EmbedderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderHandle")
            .field("expected_dimension", &self.expected_dimension)
            .field("loaded", &self.is_loaded())
            .field("loads", &self.load_count())
            .finish()
    }
}

impl EmbedderHandle {
    pub fn new<F>(expected_dimension: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn DynEmbeddingService>, RagError> + Send + Sync + 'static,
    {
        Self {
            expected_dimension,
            loader: Box::new(loader),
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Handle that always hands out the given service.
    pub fn from_service(service: Arc<dyn DynEmbeddingService>) -> Self {
        let dimension = service.dimensions();
        Self::new(dimension, move || Ok(Arc::clone(&service)))
    }

    pub fn expected_dimension(&self) -> usize {
        self.expected_dimension
    }

    /// Return the loaded model, loading it first if needed.
    pub fn acquire(&self) -> Result<Arc<dyn DynEmbeddingService>, RagError> {
        let mut slot = lock_slot(&self.slot);
        if let Some(service) = slot.as_ref() {
            return Ok(Arc::clone(service));
        }

        let service = (self.loader)()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        if service.dimensions() != self.expected_dimension {
            return Err(RagError::Embedding(format!(
                "Embedding model produces {}-dimensional vectors, expected {}",
                service.dimensions(),
                self.expected_dimension
            )));
        }

        info!(dimensions = self.expected_dimension, "Embedding model loaded");
        *slot = Some(Arc::clone(&service));
        Ok(service)
    }

    /// Embed one text. A failure invalidates the handle.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let service = self.acquire()?;
        let result = service.embed_boxed(text).await.and_then(|vector| {
            if vector.len() == self.expected_dimension {
                Ok(vector)
            } else {
                Err(RagError::Embedding(format!(
                    "Embedding has dimension {}, expected {}",
                    vector.len(),
                    self.expected_dimension
                )))
            }
        });

        if let Err(e) = &result {
            warn!(error = %e, "Embedding failed, dropping model");
            self.invalidate();
        }
        result
    }

    /// Drop the cached model so the next use reloads it.
    pub fn invalidate(&self) {
        if lock_slot(&self.slot).take().is_some() {
            debug!("Embedding model invalidated");
        }
    }

    /// Clear the model.
    pub fn release(&self) {
        if lock_slot(&self.slot).take().is_some() {
            debug!("Embedding model released");
        }
    }

    pub fn is_loaded(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Number of times the loader has produced a model.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// StoreHandle
// ---------------------------------------------------------------------------

/// Collection that a [`StoreHandle`] sets up on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
}

impl CollectionSpec {
    pub fn cosine(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            distance: Distance::Cosine,
        }
    }
}

/// Lazily opened vector store connection.
pub struct StoreHandle {
    collection: CollectionSpec,
    opener: Box<StoreOpener>,
    slot: Mutex<Option<Arc<dyn VectorStore>>>,
    opens: AtomicUsize,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("collection", &self.collection)
            .field("open", &self.is_open())
            .field("opens", &self.open_count())
            .finish()
    }
}

impl StoreHandle {
    pub fn new<F>(collection: CollectionSpec, opener: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn VectorStore>, RagError> + Send + Sync + 'static,
    {
        Self {
            collection,
            opener: Box::new(opener),
            slot: Mutex::new(None),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn collection(&self) -> &CollectionSpec {
        &self.collection
    }

    /// Return the open store, opening it first if needed.
    pub fn acquire(&self) -> Result<Arc<dyn VectorStore>, RagError> {
        let mut slot = lock_slot(&self.slot);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = (self.opener)()?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        debug!(collection = %self.collection.name, "Vector store connection opened");
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Create the collection if it is missing; check its dimension otherwise.
    pub fn ensure_collection(&self) -> Result<Arc<dyn VectorStore>, RagError> {
        let store = self.acquire()?;
        let spec = &self.collection;

        if store.collection_exists(&spec.name)? {
            let existing = store.collection_dimension(&spec.name)?;
            if existing != spec.dimension {
                return Err(RagError::Store(format!(
                    "Collection '{}' has dimension {}, configured dimension is {}",
                    spec.name, existing, spec.dimension
                )));
            }
        } else {
            store.create_collection(&spec.name, spec.dimension, spec.distance)?;
            info!(
                collection = %spec.name,
                dimension = spec.dimension,
                "Created vector collection"
            );
        }
        Ok(store)
    }

    /// Drop the cached connection so the next use reopens it.
    pub fn invalidate(&self) {
        self.close_slot("invalidated");
    }

    /// Close the connection.
    pub fn release(&self) {
        self.close_slot("released");
    }

    fn close_slot(&self, action: &str) {
        let taken = lock_slot(&self.slot).take();
        if let Some(store) = taken {
            match store.close() {
                Ok(()) => debug!(collection = %self.collection.name, action, "Vector store closed"),
                Err(e) => warn!(
                    collection = %self.collection.name,
                    action,
                    error = %e,
                    "Failed to close vector store"
                ),
            }
        }
    }

    pub fn is_open(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Number of times the opener has produced a connection.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::store::MemoryStore;

    fn memory_handle(dimension: usize) -> StoreHandle {
        StoreHandle::new(CollectionSpec::cosine("docs", dimension), || {
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn VectorStore>)
        })
    }

    #[test]
    fn test_embedder_loads_lazily_once() {
        let handle = EmbedderHandle::new(8, || {
            Ok(Arc::new(HashEmbedding::new(8)) as Arc<dyn DynEmbeddingService>)
        });
        assert!(!handle.is_loaded());
        assert_eq!(handle.load_count(), 0);

        handle.acquire().unwrap();
        handle.acquire().unwrap();
        assert!(handle.is_loaded());
        assert_eq!(handle.load_count(), 1);
    }

    #[test]
    fn test_embedder_dimension_mismatch() {
        let handle = EmbedderHandle::new(16, || {
            Ok(Arc::new(HashEmbedding::new(8)) as Arc<dyn DynEmbeddingService>)
        });
        assert!(matches!(handle.acquire(), Err(RagError::Embedding(_))));
        assert!(!handle.is_loaded());
    }

    #[tokio::test]
    async fn test_embed_failure_invalidates() {
        let handle = EmbedderHandle::from_service(Arc::new(HashEmbedding::new(4)));
        assert_eq!(handle.embed("text").await.unwrap().len(), 4);
        assert!(handle.is_loaded());

        assert!(handle.embed("").await.is_err());
        assert!(!handle.is_loaded());

        handle.embed("again").await.unwrap();
        assert_eq!(handle.load_count(), 2);
    }

    #[test]
    fn test_embedder_release() {
        let handle = EmbedderHandle::from_service(Arc::new(HashEmbedding::new(4)));
        handle.acquire().unwrap();
        handle.release();
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_store_ensure_collection_idempotent() {
        let handle = memory_handle(4);
        let store = handle.ensure_collection().unwrap();
        handle.ensure_collection().unwrap();
        assert!(store.collection_exists("docs").unwrap());
        assert_eq!(handle.open_count(), 1);
    }

    #[test]
    fn test_store_dimension_conflict() {
        let shared: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
        shared.create_collection("docs", 3, Distance::Cosine).unwrap();
        let opener_store = Arc::clone(&shared);
        let handle = StoreHandle::new(CollectionSpec::cosine("docs", 4), move || {
            Ok(Arc::clone(&opener_store))
        });
        assert!(matches!(
            handle.ensure_collection(),
            Err(RagError::Store(_))
        ));
    }

    #[test]
    fn test_store_release_closes_and_reopens() {
        let handle = memory_handle(4);
        let store = handle.acquire().unwrap();
        handle.release();
        assert!(!handle.is_open());
        assert!(store.collection_exists("docs").is_err());

        handle.ensure_collection().unwrap();
        assert_eq!(handle.open_count(), 2);
        handle.invalidate();
        assert!(!handle.is_open());
    }

    #[test]
    fn test_store_opener_failure() {
        let handle = StoreHandle::new(CollectionSpec::cosine("docs", 4), || {
            Err(RagError::Store("unreachable".to_string()))
        });
        assert!(handle.acquire().is_err());
        assert!(!handle.is_open());
        assert_eq!(handle.open_count(), 0);
    }
}
