//! Benchmarks for signal mixing operations.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::dsp::mix;

use crate::BLOCK_SIZES;

pub fn bench_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/mix");

    for &size in BLOCK_SIZES {
        // Generate test signals
        let signal_a: Vec<f32> = (0..size).map(|i| (i as f32 * 0.1).sin()).collect();
        let signal_b: Vec<f32> = (0..size).map(|i| (i as f32 * 0.15).cos()).collect();

        // Sum in-place
        let mut buffer_a = signal_a.clone();
        group.bench_with_input(BenchmarkId::new("sum_in_place", size), &size, |b, _| {
            b.iter(|| {
                buffer_a.copy_from_slice(&signal_a);
                mix::sum_in_place(black_box(&mut buffer_a), black_box(&signal_b));
            })
        });

        // Polyphony normalization of a dense cloud
        let mut buffer_a = signal_a.clone();
        group.bench_with_input(BenchmarkId::new("normalize", size), &size, |b, _| {
            b.iter(|| {
                buffer_a.copy_from_slice(&signal_a);
                let gain = mix::polyphony_gain(black_box(48));
                mix::scale_in_place(black_box(&mut buffer_a), gain);
            })
        });

        // Equal-power crossfade gain per sample
        let mut output = vec![0.0f32; size];
        group.bench_with_input(BenchmarkId::new("crossfade", size), &size, |b, _| {
            b.iter(|| {
                let step = 1.0 / size as f32;
                for (i, (out, (&old, &new))) in output
                    .iter_mut()
                    .zip(signal_a.iter().zip(&signal_b))
                    .enumerate()
                {
                    let p = i as f32 * step;
                    *out = old * mix::fade_out_gain(p) + new * mix::fade_in_gain(p);
                }
                black_box(&output);
            })
        });
    }

    group.finish();
}
