//! Benchmarks for the grain envelope.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::dsp::envelope::GrainEnvelope;

use crate::BLOCK_SIZES;

const SAMPLE_RATE: f32 = 48_000.0;

fn render(envelope: &mut GrainEnvelope, buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = envelope.next_sample();
    }
}

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Body: attack curve times Gaussian window. Long grain so the
        // benchmark never leaves the body stage.
        let mut envelope = GrainEnvelope::new(3600.0, 0.05, 0.1, 0.3, SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("body", size), &size, |b, _| {
            b.iter(|| render(&mut envelope, black_box(&mut buffer)))
        });

        // Linear release ramp
        let mut envelope = GrainEnvelope::new(0.1, 0.01, 3600.0, 0.3, SAMPLE_RATE);
        for _ in 0..2400 {
            envelope.next_sample();
        }
        envelope.release();
        group.bench_with_input(BenchmarkId::new("release", size), &size, |b, _| {
            b.iter(|| render(&mut envelope, black_box(&mut buffer)))
        });
    }

    group.finish();
}
