//! Criterion benchmarks for the SRAD pipeline.
//!
//! Run with: cargo bench -p srad_core
//! Run specific: cargo bench -p srad_core -- diffusion_iteration

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::prelude::*;

use srad_core::{
    compute_region_statistics, run_diffusion_iteration, BoundaryIndex, DiffusionWorkspace,
    SradStrategy,
};

fn random_image_f32(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| 1.0 + rng.gen::<f32>() * 254.0)
}

fn bench_region_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_statistics");

    for size in [128usize, 256, 512] {
        let img = random_image_f32(size, size, 42);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| compute_region_statistics(black_box(img.view())))
        });
    }

    group.finish();
}

fn bench_diffusion_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("diffusion_iteration");

    let strategies = [
        ("naive", SradStrategy::Naive),
        ("fused", SradStrategy::Fused),
        ("tiled", SradStrategy::Tiled),
    ];

    for size in [128usize, 256, 512] {
        for (name, strategy) in strategies {
            let img = random_image_f32(size, size, 7);
            group.throughput(Throughput::Elements((size * size) as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                let boundary = BoundaryIndex::new(size, size);
                let mut workspace = DiffusionWorkspace::new((size, size), strategy);
                let mut grid = img.mapv(f32::sqrt);
                b.iter(|| {
                    let stats = compute_region_statistics(grid.view());
                    run_diffusion_iteration(
                        &mut grid,
                        &boundary,
                        stats.q0sqr,
                        black_box(0.5),
                        &mut workspace,
                    );
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_region_statistics, bench_diffusion_iteration);
criterion_main!(benches);
