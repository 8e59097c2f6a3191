//! Benchmarks for chunking and vector store queries.
//!
//! Store benchmarks use 1,000 points by default. Set `BENCH_FULL_SCALE=1` to
//! run them against 20,000 points:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p ragline-vector
//! ```

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use ragline_core::types::ChunkPayload;
use ragline_vector::embedding::{EmbeddingService, HashEmbedding};
use ragline_vector::store::{Distance, MemoryStore, PointId, VectorRecord, VectorStore};
use ragline_vector::{SqliteStore, TextChunker};

const CI_POINT_COUNT: usize = 1_000;
const FULL_SCALE_POINT_COUNT: usize = 20_000;
const DIM: usize = 384;

fn point_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_POINT_COUNT
    } else {
        CI_POINT_COUNT
    }
}

/// Roughly one PDF page of prose, with paragraph and line breaks.
fn generate_page_text(index: usize) -> String {
    let mut text = String::new();
    for paragraph in 0..6 {
        for sentence in 0..8 {
            text.push_str(&format!(
                "Page {} paragraph {} sentence {} describes the quarterly figures \
                 and the assumptions behind them. ",
                index, paragraph, sentence
            ));
            if sentence % 3 == 2 {
                text.push('\n');
            }
        }
        text.push_str("\n\n");
    }
    text
}

fn build_records(count: usize) -> Vec<VectorRecord> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");
    let embedder = HashEmbedding::new(DIM);

    (0..count)
        .map(|i| {
            let chunk_id = format!("bench.pdf:{}:{}", i / 10, i % 10);
            let text = format!("Chunk {} of the benchmark corpus", i);
            let vector = rt.block_on(embedder.embed(&text)).expect("embed failed");
            VectorRecord {
                id: PointId::Sequence(i as u64),
                vector,
                payload: ChunkPayload {
                    text,
                    source: "bench.pdf".to_string(),
                    chunk_id,
                },
            }
        })
        .collect()
}

fn populate(store: &dyn VectorStore, records: Vec<VectorRecord>) {
    store
        .create_collection("bench", DIM, Distance::Cosine)
        .expect("create collection failed");
    store.upsert("bench", records).expect("upsert failed");
}

fn bench_chunking(c: &mut Criterion) {
    let pages: Vec<String> = (0..20).map(generate_page_text).collect();
    let chunker = TextChunker::new(500, 100).expect("valid chunker");

    let mut group = c.benchmark_group("chunking");
    group.bench_function("split_20_pages_500_100", |b| {
        b.iter(|| {
            let total: usize = pages.iter().map(|p| chunker.split_text(p).len()).sum();
            assert!(total > 0);
            total
        });
    });
    group.finish();
}

fn bench_store_query(c: &mut Criterion) {
    let count = point_count();
    let records = build_records(count);
    let query = records[count / 2].vector.clone();

    let memory = MemoryStore::new();
    populate(&memory, records.clone());

    let sqlite = SqliteStore::in_memory().expect("open sqlite store");
    populate(&sqlite, records);

    let mut group = c.benchmark_group("store_query");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("memory_top5_{}points", count), |b| {
        b.iter(|| {
            let hits = memory.query("bench", &query, 5).expect("query failed");
            assert_eq!(hits.len(), 5);
            hits
        });
    });

    group.bench_function(format!("sqlite_top5_{}points", count), |b| {
        b.iter(|| {
            let hits = sqlite.query("bench", &query, 5).expect("query failed");
            assert_eq!(hits.len(), 5);
            hits
        });
    });

    group.finish();
}

criterion_group!(benches, bench_chunking, bench_store_query);
criterion_main!(benches);
