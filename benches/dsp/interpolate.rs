//! Benchmarks for cubic fractional reads.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::dsp::interpolate::cubic_wrapped;

use crate::BLOCK_SIZES;

pub fn bench_interpolate(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/interpolate");
    let source: Vec<f32> = (0..48_000).map(|i| (i as f32 * 0.01).sin()).collect();

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Pitched read through the middle of the buffer
        group.bench_with_input(BenchmarkId::new("cubic", size), &size, |b, _| {
            b.iter(|| {
                let mut position = 24_000.25f64;
                for sample in buffer.iter_mut() {
                    *sample = cubic_wrapped(black_box(&source), 0, source.len(), position);
                    position += 1.337;
                }
            })
        });

        // Read across a short region, wrapping every few samples
        group.bench_with_input(BenchmarkId::new("wrapping", size), &size, |b, _| {
            b.iter(|| {
                let mut position = 100.5f64;
                for sample in buffer.iter_mut() {
                    *sample = cubic_wrapped(black_box(&source), 100, 132, position);
                    position += 1.5;
                }
            })
        });
    }

    group.finish();
}
