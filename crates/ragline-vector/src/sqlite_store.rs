//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian `f32` blobs next to their payload.
//! Queries load the collection and rank in process, like [`MemoryStore`].
//!
//! [`MemoryStore`]: crate::store::MemoryStore

use std::path::Path;
use std::sync::Mutex;

use ragline_core::error::RagError;
use ragline_core::types::ChunkPayload;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::store::{
    check_dimensions, check_query_dimension, rank, Distance, ScoredPoint, VectorRecord,
    VectorStore,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    dimension   INTEGER NOT NULL,
    distance    TEXT NOT NULL,
    next_batch  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS points (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    collection  TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    point_key   TEXT NOT NULL,
    vector      BLOB NOT NULL,
    text        TEXT NOT NULL,
    source      TEXT NOT NULL,
    chunk_id    TEXT NOT NULL,
    UNIQUE (collection, point_key)
);
";

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> RagError + '_ {
    move |e| RagError::Store(format!("{}: {}", context, e))
}

/// Persistent vector store in a single SQLite file.
///
/// The connection sits behind a mutex since rusqlite's `Connection` is not
/// `Sync`. Closing drops the connection; later calls fail.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> Result<Self, RagError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(db_err("Failed to open vector store"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(db_err("Failed to set pragmas"))?;

        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "Vector store opened");
        Ok(store)
    }

    /// Open a store that lives only as long as this value (for testing).
    pub fn in_memory() -> Result<Self, RagError> {
        let conn = Connection::open_in_memory().map_err(db_err("Failed to open in-memory store"))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err("Failed to set pragmas"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, RagError> {
        conn.execute_batch(SCHEMA)
            .map_err(db_err("Failed to create schema"))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Run a closure against the open connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T, RagError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RagError>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| RagError::Store(format!("Vector store lock poisoned: {}", e)))?;
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(RagError::Store("Vector store is closed".to_string())),
        }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn collection_row(conn: &Connection, collection: &str) -> Result<Option<(usize, u64)>, RagError> {
    conn.query_row(
        "SELECT dimension, next_batch FROM collections WHERE name = ?1",
        params![collection],
        |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u64)),
    )
    .optional()
    .map_err(db_err("Failed to read collection"))
}

fn require_collection(conn: &Connection, collection: &str) -> Result<(usize, u64), RagError> {
    collection_row(conn, collection)?
        .ok_or_else(|| RagError::Store(format!("Collection '{}' does not exist", collection)))
}

impl VectorStore for SqliteStore {
    fn collection_exists(&self, collection: &str) -> Result<bool, RagError> {
        self.with_conn(|conn| Ok(collection_row(conn, collection)?.is_some()))
    }

    fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), RagError> {
        self.with_conn(|conn| {
            if collection_row(conn, collection)?.is_some() {
                return Err(RagError::Store(format!(
                    "Collection '{}' already exists",
                    collection
                )));
            }
            conn.execute(
                "INSERT INTO collections (name, dimension, distance) VALUES (?1, ?2, ?3)",
                params![collection, dimension as i64, distance.as_str()],
            )
            .map_err(db_err("Failed to create collection"))?;
            debug!(collection, dimension, "Created collection");
            Ok(())
        })
    }

    fn collection_dimension(&self, collection: &str) -> Result<usize, RagError> {
        self.with_conn(|conn| Ok(require_collection(conn, collection)?.0))
    }

    fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize, RagError> {
        self.with_conn(|conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            let (dimension, batch) = require_collection(&tx, collection)?;
            check_dimensions(collection, dimension, &records)?;

            tx.execute(
                "UPDATE collections SET next_batch = next_batch + 1 WHERE name = ?1",
                params![collection],
            )
            .map_err(db_err("Failed to advance batch"))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO points (collection, point_key, vector, text, source, chunk_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT (collection, point_key) DO UPDATE SET
                             vector = excluded.vector,
                             text = excluded.text,
                             source = excluded.source,
                             chunk_id = excluded.chunk_id",
                    )
                    .map_err(db_err("Failed to prepare upsert"))?;

                for record in &records {
                    stmt.execute(params![
                        collection,
                        record.id.storage_key(batch),
                        encode_vector(&record.vector),
                        record.payload.text,
                        record.payload.source,
                        record.payload.chunk_id,
                    ])
                    .map_err(db_err("Failed to write point"))?;
                }
            }

            // Dropping `tx` without commit rolls the whole batch back.
            tx.commit().map_err(db_err("Failed to commit upsert"))?;
            debug!(collection, written = records.len(), batch, "Upserted points");
            Ok(records.len())
        })
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        self.with_conn(|conn| {
            let (dimension, _) = require_collection(conn, collection)?;
            check_query_dimension(collection, dimension, vector)?;

            let mut stmt = conn
                .prepare(
                    "SELECT point_key, vector, text, source, chunk_id
                     FROM points WHERE collection = ?1 ORDER BY seq",
                )
                .map_err(db_err("Failed to prepare query"))?;

            let rows = stmt
                .query_map(params![collection], |row| {
                    let key: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    let payload = ChunkPayload {
                        text: row.get(2)?,
                        source: row.get(3)?,
                        chunk_id: row.get(4)?,
                    };
                    Ok((key, decode_vector(&blob), payload))
                })
                .map_err(db_err("Failed to run query"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("Failed to read point"))?;

            Ok(rank(
                vector,
                rows.iter()
                    .map(|(key, vec, payload)| (key.as_str(), vec.as_slice(), payload)),
                limit,
            ))
        })
    }

    fn count(&self, collection: &str) -> Result<usize, RagError> {
        self.with_conn(|conn| {
            require_collection(conn, collection)?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM points WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )
                .map_err(db_err("Failed to count points"))?;
            Ok(count as usize)
        })
    }

    fn close(&self) -> Result<(), RagError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| RagError::Store(format!("Vector store lock poisoned: {}", e)))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| RagError::Store(format!("Failed to close vector store: {}", e)))?;
            debug!("Vector store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PointId;

    fn record(id: PointId, chunk_id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id,
            vector,
            payload: ChunkPayload {
                text: format!("text of {}", chunk_id),
                source: "doc.pdf".to_string(),
                chunk_id: chunk_id.to_string(),
            },
        }
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let v = vec![0.5f32, -1.25, 3.0e-7];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn test_create_and_query() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.collection_exists("docs").unwrap());
        store.create_collection("docs", 2, Distance::Cosine).unwrap();
        assert!(store.collection_exists("docs").unwrap());
        assert!(store.create_collection("docs", 2, Distance::Cosine).is_err());

        store
            .upsert(
                "docs",
                vec![
                    record(PointId::Sequence(0), "a", vec![0.0, 1.0]),
                    record(PointId::Sequence(1), "b", vec![1.0, 0.0]),
                ],
            )
            .unwrap();

        let hits = store.query("docs", &[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.chunk_id, "b");
        assert_eq!(hits[0].payload.text, "text of b");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_collection("docs", 3, Distance::Cosine).unwrap();
        let result = store.upsert(
            "docs",
            vec![
                record(PointId::Sequence(0), "a", vec![1.0, 0.0, 0.0]),
                record(PointId::Sequence(1), "b", vec![1.0]),
            ],
        );
        assert!(matches!(result, Err(RagError::Store(_))));
        assert_eq!(store.count("docs").unwrap(), 0);
    }

    #[test]
    fn test_query_dimension_mismatch_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_collection("docs", 3, Distance::Cosine).unwrap();
        store
            .upsert(
                "docs",
                vec![record(PointId::Sequence(0), "a", vec![1.0, 0.0, 0.0])],
            )
            .unwrap();
        let err = store.query("docs", &[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
        assert_eq!(store.query("docs", &[0.0, 0.0, 1.0], 5).unwrap().len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("vectors.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_collection("docs", 2, Distance::Cosine).unwrap();
            store
                .upsert("docs", vec![record(PointId::Sequence(0), "a", vec![1.0, 0.0])])
                .unwrap();
            store.close().unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.collection_dimension("docs").unwrap(), 2);
        assert_eq!(store.count("docs").unwrap(), 1);

        // A second batch of sequence ids appends rather than overwriting.
        store
            .upsert("docs", vec![record(PointId::Sequence(0), "a", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(store.count("docs").unwrap(), 2);
    }

    #[test]
    fn test_derived_ids_overwrite_in_place() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_collection("docs", 2, Distance::Cosine).unwrap();
        let id = PointId::from_chunk_id("doc.pdf:0:0");
        store
            .upsert("docs", vec![record(id, "doc.pdf:0:0", vec![1.0, 0.0])])
            .unwrap();
        store
            .upsert("docs", vec![record(id, "doc.pdf:0:0", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(store.count("docs").unwrap(), 1);
        let hits = store.query("docs", &[0.0, 1.0], 1).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_closed_store_errors() {
        let store = SqliteStore::in_memory().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.collection_exists("docs"),
            Err(RagError::Store(_))
        ));
        // Closing twice is harmless.
        assert!(store.close().is_ok());
    }
}
