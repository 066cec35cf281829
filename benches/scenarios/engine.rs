//! Benchmarks for full engine blocks.
//!
//! Each case warms the engine up until the grain pool reaches a steady
//! state, then measures one snapshot + one block.

use std::{collections::VecDeque, hint::black_box};

use criterion::{BenchmarkId, Criterion};
use swarm_grains::{
    config::EngineConfig,
    engine::{agents::Agent, GrainEngine},
    synth::{message::EngineMessage, sample::SampleBuffer},
};

use crate::BLOCK_SIZES;

const SAMPLE_RATE: f32 = 48_000.0;

type BenchEngine = GrainEngine<VecDeque<EngineMessage>, ()>;

pub(crate) fn swarm(count: u32, populations: usize) -> Vec<Agent> {
    (0..count)
        .map(|id| {
            let t = id as f32 / count.max(1) as f32;
            Agent {
                id,
                population: id as usize % populations,
                x: t,
                y: 1.0 - t,
                size: (t * 3.0).fract(),
                velocity: 0.2 + 0.8 * (t * 7.0).fract(),
                trail: (t * 5.0).fract(),
                ..Agent::default()
            }
        })
        .collect()
}

pub(crate) fn engine(populations: usize, voices: usize) -> BenchEngine {
    let mut engine = GrainEngine::new(
        SAMPLE_RATE,
        2,
        EngineConfig::default(),
        VecDeque::new(),
        (),
    );
    for population in 0..populations {
        let samples = (0..SAMPLE_RATE as usize)
            .map(|i| (i as f32 * (0.02 + 0.01 * population as f32)).sin() * 0.5)
            .collect();
        let queue = engine.receiver_mut();
        queue.push_back(EngineMessage::UploadSample {
            population,
            buffer: Box::new(SampleBuffer::from_mono(SAMPLE_RATE, samples).unwrap()),
        });
        queue.push_back(EngineMessage::SetVoiceLimit {
            population,
            max_voices: voices,
        });
    }
    engine
}

fn warm_up(engine: &mut BenchEngine, agents: &[Agent], buffer: &mut [f32]) {
    for _ in 0..200 {
        engine.receiver_mut().push_back(EngineMessage::UpdateAgents {
            agents: agents.to_vec(),
            config: None,
        });
        engine.process_block(buffer);
    }
}

pub fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/engine");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size * 2];

        // === SPARSE: a handful of agents, all voiced ===
        // === CROWD: many agents competing for few voices ===
        // === DENSE: many voices across populations ===
        let cases = [
            ("sparse", swarm(4, 1), engine(1, 8)),
            ("crowd", swarm(128, 2), engine(2, 6)),
            ("dense", swarm(64, 4), engine(4, 16)),
        ];

        for (name, agents, mut engine) in cases {
            warm_up(&mut engine, &agents, &mut buffer);
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    engine.receiver_mut().push_back(EngineMessage::UpdateAgents {
                        agents: agents.clone(),
                        config: None,
                    });
                    engine.process_block(black_box(&mut buffer));
                })
            });
        }
    }

    group.finish();
}
