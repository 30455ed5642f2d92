//! # Pool Allocator Benchmark
//!
//! ARCHITECT'S REQUIREMENTS:
//! - acquire/release cycle is O(1)
//! - 0 heap allocations after construction
//!
//! Run with: `cargo bench --package mindloop_core`

// Benchmarks don't need docs and may have intentionally unused code
#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mindloop_core::PoolAllocator;

#[derive(Clone, Copy)]
struct RenderProxy {
    model: u32,
    transform: [f32; 16],
}

/// Benchmark: fill a pool then drain it, the per-frame proxy pattern.
fn bench_frame_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_frame_cycle");

    for count in [256usize, 4096, 65_536] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut pool: PoolAllocator<RenderProxy> = PoolAllocator::new(count);
            let mut handles = Vec::with_capacity(count);
            b.iter(|| {
                for i in 0..count {
                    let model = u32::try_from(i).unwrap_or(u32::MAX);
                    let handle = pool
                        .acquire_with(|| RenderProxy { model, transform: [0.0; 16] })
                        .expect("sized for the frame");
                    handles.push(handle);
                }
                for handle in handles.drain(..) {
                    black_box(pool.release(handle).map(|p| p.model).ok());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark: release the whole pool in one sweep.
fn bench_release_all(c: &mut Criterion) {
    c.bench_function("pool_release_all_4096", |b| {
        let mut pool: PoolAllocator<RenderProxy> = PoolAllocator::new(4096);
        b.iter(|| {
            while pool.acquire(RenderProxy { model: 0, transform: [1.0; 16] }).is_ok() {}
            black_box(pool.release_all())
        });
    });
}

criterion_group!(benches, bench_frame_cycle, bench_release_all);
criterion_main!(benches);
