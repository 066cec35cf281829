//! Benchmarks for the cascaded band filter.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::dsp::filter::{BandFilter, BandSpec, FrequencyMap};

use crate::BLOCK_SIZES;

const SAMPLE_RATE: f32 = 48_000.0;

pub fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/filter");
    let map = FrequencyMap::default();

    for &size in BLOCK_SIZES {
        // Generate a test signal (sawtooth-like ramp)
        let input: Vec<f32> = (0..size)
            .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
            .collect();

        // Small agent: steepest slope, four stages per side
        let mut filter = BandFilter::new(&BandSpec::from_position(0.5, 0.0, SAMPLE_RATE, &map), SAMPLE_RATE);
        let mut buffer = input.clone();
        group.bench_with_input(BenchmarkId::new("narrow", size), &size, |b, _| {
            b.iter(|| {
                buffer.copy_from_slice(&input);
                filter.render(black_box(&mut buffer));
            })
        });

        // Large agent: two stages per side
        let mut filter = BandFilter::new(&BandSpec::from_position(0.5, 1.0, SAMPLE_RATE, &map), SAMPLE_RATE);
        let mut buffer = input.clone();
        group.bench_with_input(BenchmarkId::new("wide", size), &size, |b, _| {
            b.iter(|| {
                buffer.copy_from_slice(&input);
                filter.render(black_box(&mut buffer));
            })
        });

        // Band design cost, paid once per grain spawn
        group.bench_with_input(BenchmarkId::new("design", size), &size, |b, _| {
            b.iter(|| {
                let spec = BandSpec::from_position(black_box(0.3), black_box(0.6), SAMPLE_RATE, &map);
                black_box(BandFilter::new(&spec, SAMPLE_RATE));
            })
        });
    }

    group.finish();
}
