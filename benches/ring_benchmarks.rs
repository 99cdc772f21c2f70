//! Performance benchmarks for ReplayCam buffering
//!
//! Run with: cargo bench --bench ring_benchmarks
//!
//! Producers insert on capture threads, so insert cost bounds how much a
//! slow buffer can delay a camera callback or a microphone read.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replaycam::buffer::{BoundedRing, DrainQueue, SharedRing, UnitStore};
use replaycam::capture::{Resolution, VideoFrame};
use replaycam::flush::normalize_timestamps;
use replaycam::testing::synthetic_video_frame;

fn bench_ring_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ring Insert");

    // 5 s at 30 fps, 30 s at 60 fps
    for capacity in [150usize, 1800] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("u64", capacity), &capacity, |b, &capacity| {
            let mut ring = BoundedRing::new(capacity);
            let mut ts = 0u64;
            b.iter(|| {
                ts += 33_333;
                black_box(ring.insert(black_box(ts), ts));
            });
        });
    }

    let frame = synthetic_video_frame(0, Resolution::new(640, 480));
    group.bench_function("shared_frame_640x480", |b| {
        let ring = SharedRing::new(150);
        let store: Arc<dyn UnitStore<VideoFrame>> = Arc::new(ring);
        let mut ts = 0u64;
        b.iter(|| {
            ts += 33_333;
            store.insert(frame.clone(), ts);
        });
    });

    group.finish();
}

fn bench_ordered_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ring Ordered Read");

    for capacity in [150usize, 1800] {
        let mut ring = BoundedRing::new(capacity);
        // Wrapped so the walk crosses the seam
        for i in 0..(capacity as u64 * 3 / 2) {
            ring.insert(i, i * 33_333);
        }

        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(BenchmarkId::new("wrapped", capacity), &ring, |b, ring| {
            b.iter(|| ring.read_ordered().map(|(u, ts)| u ^ ts).fold(0u64, |acc, x| acc.wrapping_add(x)));
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Timestamp Normalization");

    for count in [150usize, 1800] {
        let raw: Vec<u64> = (0..count as u64).map(|i| 10_000_000 + i * 33_333).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("window_5s", count), &raw, |b, raw| {
            b.iter(|| normalize_timestamps(black_box(raw), 5_000_000));
        });
    }

    group.finish();
}

fn bench_drain_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("Drain Queue");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("push_pop", |b| {
        let queue = DrainQueue::bounded(256);
        let mut ts = 0u64;
        b.iter(|| {
            ts += 1;
            queue.push(ts, ts);
            black_box(queue.pop());
        });
    });

    group.bench_function("push_overflowing", |b| {
        let queue = DrainQueue::bounded(64);
        let mut ts = 0u64;
        b.iter(|| {
            ts += 1;
            black_box(queue.push(ts, ts));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ring_insert, bench_ordered_read, bench_normalize, bench_drain_queue);
criterion_main!(benches);
