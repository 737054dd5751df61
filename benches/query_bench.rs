//! Benchmarks for the index query and chunk fetch paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use logstore::chunk::{encode_chunk, Chunk, ChunkFetcher, DecodeContext, LogEntry, Pool};
use logstore::context::QueryContext;
use logstore::index::{ChunkRef, Labels};
use logstore::query::{
    do_parallel_queries, IndexDeduper, IndexEntry, IndexQuery, QueryPagesCallback, ReadBatch,
    VecReadBatch,
};
use logstore::storage::{FsChunkStore, IndexWriter, MemoryIndexClient, TableClient, WriteBatch};
use std::sync::Arc;
use tempfile::tempdir;

fn discard() -> QueryPagesCallback {
    Arc::new(|_: &IndexQuery, batch: &dyn ReadBatch| {
        black_box(batch.iter().count());
        true
    })
}

fn bench_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup");

    for size in [100, 1000, 10000] {
        let batch = VecReadBatch::new(
            (0..size)
                .map(|i| IndexEntry::new(format!("range-{i:08}"), "value"))
                .collect(),
        );
        let query = IndexQuery::new("index_1", "h1");

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("unique_{}", size), |b| {
            b.iter(|| {
                let deduper = IndexDeduper::new(discard());
                deduper.callback()(&query, black_box(&batch));
            })
        });

        // second pass over the same batch only hits the read-locked fast path
        group.bench_function(format!("all_seen_{}", size), |b| {
            let deduper = IndexDeduper::new(discard());
            let callback = deduper.callback();
            callback(&query, &batch);

            b.iter(|| callback(&query, black_box(&batch)))
        });
    }

    group.finish();
}

fn bench_parallel_queries(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("parallel_queries");

    let client = rt.block_on(async {
        let client = Arc::new(MemoryIndexClient::with_page_size(100));
        client.create_table("index_1").await.unwrap();

        let mut batch = WriteBatch::new();
        for h in 0..50 {
            for r in 0..200 {
                batch.add("index_1", format!("h{h}"), format!("r{r:05}"), "v");
            }
        }
        client.batch_write(batch).await.unwrap();
        client
    });

    for count in [50, 500] {
        let queries: Vec<IndexQuery> = (0..count)
            .map(|i| IndexQuery::new("index_1", format!("h{}", i % 50)))
            .collect();

        group.bench_function(format!("queries_{}", count), |b| {
            b.to_async(&rt).iter(|| {
                let client = Arc::clone(&client);
                let queries = queries.clone();
                async move {
                    do_parallel_queries(&QueryContext::new(), client, queries, discard())
                        .await
                        .unwrap()
                }
            })
        });
    }

    group.finish();
}

fn bench_chunk_fetch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunk_fetch");

    let dir = tempdir().unwrap();
    let store = Arc::new(FsChunkStore::open(dir.path()).unwrap());

    let refs: Vec<ChunkRef> = rt.block_on(async {
        let mut refs = Vec::new();
        for stream in 0..64 {
            let pod = format!("pod-{stream}");
            let labels = Labels::new([("app", "bench"), ("pod", pod.as_str())]);
            let entries: Vec<LogEntry> = (0..1000)
                .map(|i| LogEntry::new(i, format!("level=info msg=\"request {i}\" status=200")))
                .collect();
            refs.push(store.put("bench", &labels, &entries).await.unwrap());
        }
        refs
    });

    group.throughput(Throughput::Elements(refs.len() as u64));

    for workers in [1, 8, 32] {
        let fetcher = ChunkFetcher::new(Pool::new(DecodeContext::new), workers);

        group.bench_function(format!("workers_{}", workers), |b| {
            b.to_async(&rt).iter(|| {
                let chunks: Vec<Chunk> = refs.iter().cloned().map(Chunk::from_ref).collect();
                let store = Arc::clone(&store);
                let fetcher = fetcher.clone();
                async move {
                    let result = fetcher.fetch(&QueryContext::new(), chunks, store).await;
                    assert!(result.is_complete());
                }
            })
        });
    }

    let labels = Labels::new([("app", "bench")]);
    let entries: Vec<LogEntry> = (0..1000)
        .map(|i| LogEntry::new(i, format!("line {i}")))
        .collect();
    group.bench_function("encode_1000", |b| {
        b.iter(|| encode_chunk("bench", black_box(&labels), black_box(&entries)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_dedup, bench_parallel_queries, bench_chunk_fetch);
criterion_main!(benches);
