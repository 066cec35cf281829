//! Benchmarks for voice allocation under churn.
//!
//! Agent speeds rotate every block so the candidate set never settles;
//! this is the worst case for ranking and pending bookkeeping.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use swarm_grains::synth::message::EngineMessage;

use super::engine::{engine, swarm};

pub fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/allocation");

    for &agents in &[16u32, 128, 512] {
        let mut buffer = vec![0.0f32; 128 * 2];
        let mut engine = engine(1, 8);
        let mut snapshot = swarm(agents, 1);
        let mut round = 0usize;

        group.bench_with_input(BenchmarkId::new("churn", agents), &agents, |b, _| {
            b.iter(|| {
                round += 1;
                for (i, agent) in snapshot.iter_mut().enumerate() {
                    agent.velocity = (((i + round) % 17) as f32 + 1.0) / 17.0;
                }
                engine.receiver_mut().push_back(EngineMessage::UpdateAgents {
                    agents: snapshot.clone(),
                    config: None,
                });
                engine.process_block(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}
