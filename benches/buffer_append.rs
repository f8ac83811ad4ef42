//! Benchmarks for signal buffer operations
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serialscope::buffer::{BufferEventKind, MultiSignalRegistry};
use serialscope::RingSignalBuffer;

fn bench_ring_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_append");

    for size in [1000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("untimed", size), size, |b, &size| {
            let mut buffer = RingSignalBuffer::new("v", size).unwrap();
            let mut i = 0u64;
            b.iter(|| {
                buffer.append(black_box(i as f64));
                i = i.wrapping_add(1);
            });
        });

        group.bench_with_input(BenchmarkId::new("timed", size), size, |b, &size| {
            let mut buffer = RingSignalBuffer::new("v", size).unwrap().with_time();
            let mut i = 0u64;
            b.iter(|| {
                buffer.append(black_box(i as f64));
                i = i.wrapping_add(1);
            });
        });
    }

    group.finish();
}

fn bench_full_auto_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_auto_clear");

    for size in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("window", size), size, |b, &size| {
            let mut buffer = RingSignalBuffer::new("v", size)
                .unwrap()
                .with_auto_clear(true);
            buffer.on(BufferEventKind::Full, |event| {
                black_box(event);
            });
            b.iter(|| {
                for i in 0..size {
                    buffer.append(i as f64);
                }
            });
        });
    }

    group.finish();
}

fn bench_registry_append_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_append_all");

    for signals in [1usize, 4, 16].iter() {
        let names: Vec<String> = (0..*signals).map(|i| format!("s{}", i)).collect();
        let mut registry = MultiSignalRegistry::new(names.clone(), 10_000, true).unwrap();

        group.throughput(Throughput::Elements(*signals as u64));
        group.bench_function(BenchmarkId::new("batch", signals), |b| {
            let mut i = 0u64;
            b.iter(|| {
                let report = registry.append_all(names.iter().map(|n| (n, i as f64)));
                i = i.wrapping_add(1);
                black_box(report)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ring_append,
    bench_full_auto_clear,
    bench_registry_append_all
);
criterion_main!(benches);
