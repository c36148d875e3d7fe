//! Credential rotation and claiming benchmark
//!
//! Measures the shared rotator under thread contention and the in-memory
//! claim → flag cycle that every worker pool iteration goes through.

use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use crawlmark_harvester::credentials::{CredentialRotator, CredentialSet};
use crawlmark_harvester::persistence::{InMemoryMarkingStore, MarkingStore, SelectionOrder};
use crawlmark_harvester::requirement::Requirement;

fn rotator(size: usize) -> CredentialRotator {
    let pool = (0..size)
        .map(|i| CredentialSet::new([("dbcl2", format!("session-{}", i))]))
        .collect();
    CredentialRotator::new(pool).unwrap()
}

/// Benchmark uncontended next() (baseline)
fn bench_next_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("credential_rotation/single");
    group.throughput(Throughput::Elements(1));

    for size in [1, 3, 16] {
        let rotator = rotator(size);
        group.bench_with_input(BenchmarkId::new("pool", size), &size, |b, _| {
            b.iter(|| rotator.next())
        });
    }

    group.finish();
}

/// Benchmark next() from many threads at once (contention)
fn bench_next_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("credential_rotation/contended");
    group.sample_size(20);

    for threads in [2, 4, 8] {
        let calls_per_thread = 10_000u64;
        group.throughput(Throughput::Elements(calls_per_thread * threads as u64));
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &threads,
            |b, &threads| {
                let rotator = Arc::new(rotator(3));
                b.iter_custom(|iters| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        std::thread::scope(|scope| {
                            for _ in 0..threads {
                                let rotator = Arc::clone(&rotator);
                                scope.spawn(move || {
                                    for _ in 0..calls_per_thread {
                                        criterion::black_box(rotator.next_index());
                                    }
                                });
                            }
                        });
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmark claiming and flagging a full marking table in batches
fn bench_claim_cycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("credential_rotation/claim_cycle");
    group.sample_size(20);

    for batch_size in [1, 10, 50] {
        let markings = 1_000u64;
        group.throughput(Throughput::Elements(markings));
        group.bench_with_input(
            BenchmarkId::new("batch", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.to_async(&rt).iter(|| async move {
                    let store =
                        InMemoryMarkingStore::new().with_selection_order(SelectionOrder::Stable);
                    store
                        .seed_markings((0..markings).map(|i| i.to_string()).collect())
                        .await
                        .unwrap();

                    loop {
                        let batch = store
                            .fetch_unfinished_markings(Requirement::PersonProfile, batch_size)
                            .await
                            .unwrap();
                        if batch.is_empty() {
                            break;
                        }
                        for marking in batch {
                            store
                                .set_flag(&marking.person_id, Requirement::PersonProfile, true)
                                .await
                                .unwrap();
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_next_single,
    bench_next_contended,
    bench_claim_cycle
);
criterion_main!(benches);
