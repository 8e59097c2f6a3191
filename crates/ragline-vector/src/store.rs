//! Vector store abstraction and the in-memory backend.
//!
//! A store holds named collections of fixed-dimension vectors, each carrying
//! a [`ChunkPayload`]. Queries are brute-force cosine similarity, which is
//! adequate for per-directory corpora.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use ragline_core::error::RagError;
use ragline_core::types::ChunkPayload;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Cosine,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(Distance::Cosine),
            _ => None,
        }
    }
}

/// Identifier of a point inside a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointId {
    /// Position within one upsert batch. The store scopes these to the batch,
    /// so repeated ingestion appends new points.
    Sequence(u64),
    /// Stable identifier derived from a chunk id. Re-ingesting the same chunk
    /// overwrites its point.
    Derived(Uuid),
}

impl PointId {
    /// Derive a stable point id from a chunk id (UUID v5 in the OID namespace).
    pub fn from_chunk_id(chunk_id: &str) -> Self {
        PointId::Derived(Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()))
    }

    /// Storage key of this point, given the batch it was written in.
    pub fn storage_key(&self, batch: u64) -> String {
        match self {
            PointId::Sequence(seq) => format!("{}-{}", batch, seq),
            PointId::Derived(uuid) => uuid.to_string(),
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Sequence(seq) => write!(f, "{}", seq),
            PointId::Derived(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// A vector with its id and payload, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    /// Storage key of the matching point.
    pub key: String,
    /// Cosine similarity in [-1, 1].
    pub score: f64,
    pub payload: ChunkPayload,
}

/// Storage backend for embedded chunks.
///
/// All methods fail with [`RagError::Store`] once [`VectorStore::close`] has
/// been called.
pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, collection: &str) -> Result<bool, RagError>;

    /// Create a collection. Fails if it already exists.
    fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), RagError>;

    /// Dimension of an existing collection.
    fn collection_dimension(&self, collection: &str) -> Result<usize, RagError>;

    /// Write a batch of records atomically: either every record is stored or
    /// none is. Returns the number of records written.
    fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, RagError>;

    /// Return up to `limit` points ordered by descending similarity. Equal
    /// scores keep insertion order. A query vector whose length differs from
    /// the collection dimension is rejected.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RagError>;

    /// Number of points in a collection.
    fn count(&self, collection: &str) -> Result<usize, RagError>;

    /// Release the underlying resources.
    fn close(&self) -> Result<(), RagError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Check every record against the collection dimension before any write.
pub(crate) fn check_dimensions(
    collection: &str,
    dimension: usize,
    records: &[VectorRecord],
) -> Result<(), RagError> {
    match records.iter().find(|r| r.vector.len() != dimension) {
        Some(bad) => Err(RagError::Store(format!(
            "Vector for {} has dimension {}, collection '{}' expects {}",
            bad.payload.chunk_id,
            bad.vector.len(),
            collection,
            dimension
        ))),
        None => Ok(()),
    }
}

/// Reject a query vector that does not match the collection dimension.
pub(crate) fn check_query_dimension(
    collection: &str,
    dimension: usize,
    vector: &[f32],
) -> Result<(), RagError> {
    if vector.len() != dimension {
        return Err(RagError::Store(format!(
            "Query vector has dimension {}, collection '{}' expects {}",
            vector.len(),
            collection,
            dimension
        )));
    }
    Ok(())
}

/// Score candidates and keep the best `limit`, preserving insertion order on
/// ties. `candidates` must already be in insertion order.
pub(crate) fn rank<'a, I>(query: &[f32], candidates: I, limit: usize) -> Vec<ScoredPoint>
where
    I: Iterator<Item = (&'a str, &'a [f32], &'a ChunkPayload)>,
{
    let mut scored: Vec<ScoredPoint> = candidates
        .map(|(key, vector, payload)| ScoredPoint {
            key: key.to_string(),
            score: cosine_similarity(query, vector),
            payload: payload.clone(),
        })
        .collect();

    // sort_by is stable, so ties keep insertion order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

fn missing_collection(collection: &str) -> RagError {
    RagError::Store(format!("Collection '{}' does not exist", collection))
}

fn closed_store() -> RagError {
    RagError::Store("Vector store is closed".to_string())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StoredPoint {
    key: String,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

#[derive(Debug)]
struct MemoryCollection {
    dimension: usize,
    next_batch: u64,
    /// Points in insertion order.
    points: Vec<StoredPoint>,
    /// Storage key to position in `points`.
    positions: HashMap<String, usize>,
}

/// Process-local vector store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), RagError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_store());
        }
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryCollection>>, RagError> {
        self.ensure_open()?;
        self.collections
            .read()
            .map_err(|e| RagError::Store(format!("Lock poisoned: {}", e)))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>, RagError> {
        self.ensure_open()?;
        self.collections
            .write()
            .map_err(|e| RagError::Store(format!("Lock poisoned: {}", e)))
    }
}

impl VectorStore for MemoryStore {
    fn collection_exists(&self, collection: &str) -> Result<bool, RagError> {
        Ok(self.read()?.contains_key(collection))
    }

    fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), RagError> {
        let mut collections = self.write()?;
        if collections.contains_key(collection) {
            return Err(RagError::Store(format!(
                "Collection '{}' already exists",
                collection
            )));
        }
        collections.insert(
            collection.to_string(),
            MemoryCollection {
                dimension,
                next_batch: 0,
                points: Vec::new(),
                positions: HashMap::new(),
            },
        );
        debug!(collection, dimension, distance = distance.as_str(), "Created collection");
        Ok(())
    }

    fn collection_dimension(&self, collection: &str) -> Result<usize, RagError> {
        self.read()?
            .get(collection)
            .map(|c| c.dimension)
            .ok_or_else(|| missing_collection(collection))
    }

    fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, RagError> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        check_dimensions(collection, target.dimension, &records)?;

        let batch = target.next_batch;
        target.next_batch += 1;

        let written = records.len();
        for record in records {
            let key = record.id.storage_key(batch);
            match target.positions.get(&key) {
                Some(&pos) => {
                    let point = &mut target.points[pos];
                    point.vector = record.vector;
                    point.payload = record.payload;
                }
                None => {
                    target.positions.insert(key.clone(), target.points.len());
                    target.points.push(StoredPoint {
                        key,
                        vector: record.vector,
                        payload: record.payload,
                    });
                }
            }
        }
        debug!(collection, written, batch, "Upserted points");
        Ok(written)
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        let collections = self.read()?;
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        check_query_dimension(collection, target.dimension, vector)?;
        Ok(rank(
            vector,
            target
                .points
                .iter()
                .map(|p| (p.key.as_str(), p.vector.as_slice(), &p.payload)),
            limit,
        ))
    }

    fn count(&self, collection: &str) -> Result<usize, RagError> {
        self.read()?
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| missing_collection(collection))
    }

    fn close(&self) -> Result<(), RagError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
