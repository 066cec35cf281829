//! Benchmarks for the soft limiter and meter.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::dsp::limiter::{soft_limit_buffer, LevelMeter};

use crate::BLOCK_SIZES;

pub fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/limiter");

    for &size in BLOCK_SIZES {
        // Hot signal: roughly half the samples cross the knee
        let input: Vec<f32> = (0..size).map(|i| (i as f32 * 0.05).sin() * 1.5).collect();
        let mut buffer = input.clone();
        group.bench_with_input(BenchmarkId::new("soft_limit", size), &size, |b, _| {
            b.iter(|| {
                buffer.copy_from_slice(&input);
                black_box(soft_limit_buffer(black_box(&mut buffer), 0.8));
            })
        });

        let mut meter = LevelMeter::new(0.3);
        group.bench_with_input(BenchmarkId::new("meter", size), &size, |b, _| {
            b.iter(|| black_box(meter.process(black_box(&input), size, 48_000.0)))
        });
    }

    group.finish();
}
