//! Volume and record log benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nodestore_bench::utils::{random_data, sample_record};
use nodestore_server::{RecordIndex, SegmentLocation};
use nodestore_storage::{FileBackend, InMemoryBackend, SharedBackend, StorageBackend};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn file_backend(dir: &TempDir, name: &str) -> FileBackend {
    FileBackend::open_with_create_dirs(&dir.path().join(name)).unwrap()
}

/// Benchmark segment appends to a volume.
fn bench_volume_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_append");

    for size in [1024usize, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = random_data(*size);

        group.bench_with_input(BenchmarkId::new("inmemory", size), &data, |b, data| {
            let backend = InMemoryBackend::new();
            b.iter(|| black_box(backend.append(black_box(data)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("file", size), &data, |b, data| {
            let temp_dir = TempDir::new().unwrap();
            let backend = file_backend(&temp_dir, "volume.dat");
            b.iter(|| black_box(backend.append(black_box(data)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark several workers appending to one shared volume.
fn bench_shared_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_append");
    group.sample_size(20);

    for writers in [1usize, 4].iter() {
        group.throughput(Throughput::Bytes((writers * 100 * 4096) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(writers),
            writers,
            |b, &writers| {
                let temp_dir = TempDir::new().unwrap();
                let volume: SharedBackend = Arc::new(file_backend(&temp_dir, "volume.dat"));
                let data = random_data(4096);

                b.iter(|| {
                    thread::scope(|scope| {
                        for _ in 0..writers {
                            scope.spawn(|| {
                                for _ in 0..100 {
                                    volume.append(&data).unwrap();
                                }
                            });
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

/// Benchmark segment reads at scattered offsets.
fn bench_segment_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_read");
    let segment_size = 4096;
    let segment_count = 1000;

    let temp_dir = TempDir::new().unwrap();
    let backend = file_backend(&temp_dir, "volume.dat");
    let data = random_data(segment_size);
    let offsets: Vec<u64> = (0..segment_count)
        .map(|_| backend.append(&data).unwrap())
        .collect();
    backend.flush().unwrap();

    group.throughput(Throughput::Bytes(segment_size as u64));
    group.bench_function("file_1000_segments", |b| {
        let mut idx = 0;
        b.iter(|| {
            let offset = offsets[(idx * 7) % segment_count];
            let result = backend.read_at(black_box(offset), segment_size).unwrap();
            idx = (idx + 1) % segment_count;
            black_box(result);
        });
    });

    group.finish();
}

/// Benchmark record index inserts, with and without a sync per insert.
fn bench_index_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_insert");
    group.sample_size(20);

    for sync in [false, true] {
        group.bench_function(if sync { "file_sync" } else { "file_nosync" }, |b| {
            let temp_dir = TempDir::new().unwrap();
            let log = Arc::new(file_backend(&temp_dir, "records.log"));
            let index = RecordIndex::open(log, sync).unwrap();
            let record = sample_record("bench.bin", 4096);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let location = SegmentLocation {
                    offset: n * 4096,
                    length: 4096,
                };
                index
                    .insert(&format!("key-{n}"), record.clone(), location)
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark lookups and log replay of a populated index.
fn bench_index_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_read");

    let log: SharedBackend = Arc::new(InMemoryBackend::new());
    let index = RecordIndex::open(Arc::clone(&log), false).unwrap();
    for n in 0..1000u64 {
        index
            .insert(
                &format!("key-{n}"),
                sample_record("bench.bin", 4096),
                SegmentLocation {
                    offset: n * 4096,
                    length: 4096,
                },
            )
            .unwrap();
    }

    group.bench_function("lookup", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n = (n + 7) % 1000;
            black_box(index.lookup(&format!("key-{n}"), 7, 1).unwrap());
        });
    });

    group.bench_function("reopen_1000", |b| {
        b.iter(|| black_box(RecordIndex::open(Arc::clone(&log), false).unwrap().len()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_volume_append,
    bench_shared_append,
    bench_segment_read,
    bench_index_insert,
    bench_index_read,
);

criterion_main!(benches);
