//! Turns agent motion into grain spawns.
//!
//! ```text
//!   trail t ∈ 0..1 sets the grain shape
//!   ───────────────────────────────────
//!   length   = lerp(min_len,     max_len,     t)
//!   overlap  = lerp(min_overlap, max_overlap, t)
//!   rate     = min(overlap / length, rate_cap)        grains / second
//!   attack   = lerp(min_attack,  max_attack,  t)
//!   release  = lerp(min_release, max_release, t)
//!
//!   velocity v sets the loudness
//!   ────────────────────────────
//!   gain     = volume · v^(power · curve) · gain_scale
//!
//!   One pass per agent snapshot
//!   ───────────────────────────
//!   now ────────┬──────────── now + lookahead
//!               │  ▲    ▲    ▲
//!               │  next grain times, 1 / rate apart, at most
//!               │  `max_spawns_per_update` per agent per pass
//! ```
//!
//! A timer that fell more than `drift_limit` behind (the host stalled)
//! restarts at `now` instead of bursting to catch up. A smaller lag skips
//! the missed slots, so at most one late grain lands on `now`. Timers are
//! dropped while an agent is idle, muted or has no sample, and start fresh
//! at `now` when it plays again.

use crate::{
    config::EngineConfig,
    dsp::filter::lerp,
    synth::{
        grain::GrainParams,
        message::Telemetry,
        pool::GrainPool,
        sample::{SampleStore, MAX_POPULATIONS},
    },
};

use super::{
    agents::{Agent, AgentArena, GrainTimer},
    allocator::{FadeDirection, VoiceAllocator},
};

/// Host-controlled per-population playback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationSettings {
    pub volume: f32,
    /// Transposition in semitones.
    pub pitch: f32,
    pub muted: bool,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 0.0,
            muted: false,
        }
    }
}

/// Grain shape derived from an agent's trail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainTiming {
    pub duration: f32,
    pub rate: f32,
    pub attack: f32,
    pub release: f32,
}

impl GrainTiming {
    pub fn from_trail(trail: f32, config: &EngineConfig) -> Self {
        let t = trail.clamp(0.0, 1.0);
        let duration = lerp(config.min_grain_length, config.max_grain_length, t).max(1e-3);
        let overlap = lerp(config.min_overlap, config.max_overlap, t);
        Self {
            duration,
            rate: (overlap / duration).min(config.rate_cap).max(1e-3),
            attack: lerp(config.min_attack, config.max_attack, t),
            release: lerp(config.min_release, config.max_release, t),
        }
    }
}

/// Velocity-shaped gain before population volume.
pub fn velocity_gain(agent: &Agent, config: &EngineConfig) -> f32 {
    let exponent = config.velocity_gain_power * agent.curve;
    agent.velocity.clamp(0.0, 1.0).powf(exponent) * agent.gain_scale
}

/// Source frames per output frame for a pitch offset and rate mismatch.
pub fn playback_rate(semitones: f32, buffer_rate: f32, engine_rate: f32) -> f64 {
    let pitch = (semitones as f64 / 12.0).exp2();
    pitch * buffer_rate as f64 / engine_rate as f64
}

/// Everything a scheduling pass reads but does not own.
pub struct SchedulePass<'a> {
    pub frame: u64,
    pub sample_rate: f32,
    pub config: &'a EngineConfig,
    pub store: &'a SampleStore,
    pub allocator: &'a VoiceAllocator,
    pub populations: &'a [PopulationSettings; MAX_POPULATIONS],
}

impl SchedulePass<'_> {
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    fn to_frame(&self, time: f64) -> u64 {
        (time * self.sample_rate as f64).round().max(0.0) as u64
    }
}

#[derive(Debug, Default)]
pub struct GrainScheduler {
    spawned: u64,
}

impl GrainScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total grains spawned since creation.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Run one scheduling pass over every agent.
    pub fn run(
        &mut self,
        pass: &SchedulePass,
        arena: &mut AgentArena,
        pool: &mut GrainPool,
        mut on_telemetry: impl FnMut(Telemetry),
    ) {
        let now = pass.now();
        let config = pass.config;

        for (_, state) in arena.iter_mut() {
            let agent = state.agent;
            let moving = state.update_motion(config.velocity_threshold) && agent.is_moving;

            let previous = state.crossfade;
            let fade = state.settle_crossfade(now);
            if let Some(reported) = fade.or(previous) {
                on_telemetry(Telemetry::Crossfade {
                    population: agent.population,
                    agent: agent.id,
                    direction: reported.direction,
                    progress: reported.progress(now),
                });
            }
            let voiced = pass.allocator.is_allocated(agent.population, agent.id);
            let fading_out = fade.is_some_and(|f| f.direction == FadeDirection::Out);
            if !voiced && !fading_out {
                if state.timer.take().is_some() {
                    pool.release_agent(agent.id, pass.frame);
                }
                continue;
            }

            let settings = &pass.populations[agent.population];
            let Some(region) = pass.store.region(agent.population) else {
                state.timer = None;
                continue;
            };
            if settings.muted || !moving {
                state.timer = None;
                continue;
            }

            let timing = GrainTiming::from_trail(agent.trail, config);
            let timer = state.timer.get_or_insert(GrainTimer {
                next_grain_time: now,
                grain_rate: timing.rate,
            });
            timer.grain_rate = timing.rate;
            let interval = 1.0 / timing.rate as f64;
            let behind = now - timer.next_grain_time;
            if behind > config.drift_limit {
                timer.next_grain_time = now;
            } else if behind > 0.0 {
                timer.next_grain_time += (behind / interval).floor() * interval;
            }

            let gain = settings.volume * velocity_gain(&agent, config);
            let rate = playback_rate(settings.pitch, region.sample_rate, pass.sample_rate);
            let horizon = now + config.schedule_lookahead;

            let mut spawned = 0;
            while timer.next_grain_time <= horizon && spawned < config.max_spawns_per_update {
                let start = timer.next_grain_time.max(now);
                let params = GrainParams {
                    agent: agent.id,
                    population: agent.population,
                    start_frame: pass.to_frame(start),
                    duration: timing.duration,
                    attack: timing.attack,
                    release: timing.release,
                    gain,
                    x: agent.x.clamp(0.0, 1.0),
                    y: agent.y.clamp(0.0, 1.0),
                    size: agent.size.clamp(0.0, 1.0),
                    center: region.frame_at(agent.x),
                    playback_rate: rate,
                    generation: region.generation,
                };
                if pool
                    .spawn(&params, config.window_sigma, &config.frequency, pass.sample_rate)
                    .is_some()
                {
                    self.spawned += 1;
                }
                timer.next_grain_time += interval;
                spawned += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sample::SampleBuffer;

    #[test]
    fn trail_maps_linearly() {
        let config = EngineConfig::default();
        let short = GrainTiming::from_trail(0.0, &config);
        let long = GrainTiming::from_trail(1.0, &config);

        assert_eq!(short.duration, config.min_grain_length);
        assert!((long.duration - config.max_grain_length).abs() < 1e-6);
        assert_eq!(short.attack, config.min_attack);
        assert!((long.release - config.max_release).abs() < 1e-6);
        // 1 / 0.03 = 33.3 grains per second, under the cap.
        assert!((short.rate - 1.0 / 0.03).abs() < 1e-3);
        // 4 / 0.25 = 16 grains per second.
        assert!((long.rate - 16.0).abs() < 1e-3);
    }

    #[test]
    fn rate_is_capped() {
        let config = EngineConfig {
            max_overlap: 100.0,
            ..EngineConfig::default()
        };
        assert_eq!(GrainTiming::from_trail(1.0, &config).rate, config.rate_cap);
    }

    #[test]
    fn velocity_curve_shapes_gain() {
        let config = EngineConfig::default();
        let agent = Agent {
            velocity: 0.5,
            gain_scale: 0.5,
            ..Agent::default()
        };
        let expected = 0.5f32.powf(0.7) * 0.5;
        assert!((velocity_gain(&agent, &config) - expected).abs() < 1e-6);

        let still = Agent {
            velocity: 0.0,
            ..agent
        };
        assert_eq!(velocity_gain(&still, &config), 0.0);
    }

    #[test]
    fn pitch_and_rate_mismatch_combine() {
        assert!((playback_rate(12.0, 48_000.0, 48_000.0) - 2.0).abs() < 1e-9);
        assert!((playback_rate(0.0, 24_000.0, 48_000.0) - 0.5).abs() < 1e-9);
    }

    fn pass_fixture() -> (EngineConfig, SampleStore, VoiceAllocator) {
        let mut store = SampleStore::new();
        store.upload(
            0,
            Box::new(SampleBuffer::from_mono(48_000.0, vec![0.1; 48_000]).unwrap()),
        );
        (
            EngineConfig::default(),
            store,
            VoiceAllocator::new(8, 100.0, 80.0, 16),
        )
    }

    #[test]
    fn voiced_moving_agent_spawns_at_most_cap_per_pass() {
        let (config, store, mut allocator) = pass_fixture();
        let mut arena = AgentArena::with_capacity(4);
        let mut pool = GrainPool::new(64);
        let populations = [PopulationSettings::default(); MAX_POPULATIONS];
        arena.begin_update();
        arena.upsert(Agent {
            id: 1,
            velocity: 0.5,
            trail: 0.0,
            ..Agent::default()
        });
        arena.expire(|_, _| {});
        allocator.tick(0.0, &mut arena, &store, |_| {});

        let pass = SchedulePass {
            frame: 0,
            sample_rate: 48_000.0,
            config: &config,
            store: &store,
            allocator: &allocator,
            populations: &populations,
        };
        let mut scheduler = GrainScheduler::new();
        scheduler.run(&pass, &mut arena, &mut pool, |_| {});

        // 33 grains/s over a 20 ms lookahead: t = 0 and t = 0.03 > 0.02.
        assert_eq!(pool.len(), 1);
        let timer = arena.get_by_id(1).unwrap().timer.unwrap();
        assert!((timer.next_grain_time - 0.03).abs() < 1e-6);

        // A host stall far past the drift limit restarts the timer at now.
        let pass = SchedulePass { frame: 48_000, ..pass };
        scheduler.run(&pass, &mut arena, &mut pool, |_| {});
        let timer = arena.get_by_id(1).unwrap().timer.unwrap();
        assert!((timer.next_grain_time - 1.03).abs() < 1e-6);
        assert!(scheduler.spawned() <= 1 + config.max_spawns_per_update as u64);
    }

    #[test]
    fn late_timer_never_stacks_grains() {
        let (config, store, mut allocator) = pass_fixture();
        let mut arena = AgentArena::with_capacity(4);
        let mut pool = GrainPool::new(64);
        let populations = [PopulationSettings::default(); MAX_POPULATIONS];
        arena.begin_update();
        arena.upsert(Agent {
            id: 1,
            velocity: 0.5,
            trail: 0.0,
            ..Agent::default()
        });
        arena.expire(|_, _| {});
        allocator.tick(0.0, &mut arena, &store, |_| {});

        let mut scheduler = GrainScheduler::new();
        let pass = SchedulePass {
            frame: 0,
            sample_rate: 48_000.0,
            config: &config,
            store: &store,
            allocator: &allocator,
            populations: &populations,
        };
        scheduler.run(&pass, &mut arena, &mut pool, |_| {});

        // 0.29 s later, well inside the drift limit: several slots were missed.
        let pass = SchedulePass {
            frame: 13_920,
            ..pass
        };
        scheduler.run(&pass, &mut arena, &mut pool, |_| {});

        let mut starts: Vec<u64> = pool.iter().map(|grain| grain.start_frame()).collect();
        starts.sort_unstable();
        starts.dedup();
        assert_eq!(starts.len(), pool.len(), "grains share a start frame");
        let timer = arena.get_by_id(1).unwrap().timer.unwrap();
        assert!(timer.next_grain_time > 0.29);
        assert!(timer.next_grain_time <= 0.29 + config.schedule_lookahead + 0.03 + 1e-6);
    }

    #[test]
    fn idle_agent_restarts_timer_on_resume() {
        let (config, store, mut allocator) = pass_fixture();
        let mut arena = AgentArena::with_capacity(4);
        let mut pool = GrainPool::new(64);
        let populations = [PopulationSettings::default(); MAX_POPULATIONS];
        let mover = Agent {
            id: 1,
            velocity: 0.5,
            trail: 0.0,
            ..Agent::default()
        };
        let snapshot = |arena: &mut AgentArena, is_moving: bool| {
            arena.begin_update();
            arena.upsert(Agent { is_moving, ..mover });
            arena.expire(|_, _| {});
        };
        snapshot(&mut arena, true);
        allocator.tick(0.0, &mut arena, &store, |_| {});

        let mut scheduler = GrainScheduler::new();
        let mut run = |frame: u64, arena: &mut AgentArena, pool: &mut GrainPool| {
            let pass = SchedulePass {
                frame,
                sample_rate: 48_000.0,
                config: &config,
                store: &store,
                allocator: &allocator,
                populations: &populations,
            };
            scheduler.run(&pass, arena, pool, |_| {});
        };
        run(0, &mut arena, &mut pool);

        snapshot(&mut arena, false);
        run(4_800, &mut arena, &mut pool);
        assert!(arena.get_by_id(1).unwrap().timer.is_none());

        pool.retain(|_| false);
        snapshot(&mut arena, true);
        run(16_640, &mut arena, &mut pool);
        assert_eq!(pool.len(), 1);
        let timer = arena.get_by_id(1).unwrap().timer.unwrap();
        assert!((timer.next_grain_time - (16_640.0 / 48_000.0 + 0.03)).abs() < 1e-6);
    }

    #[test]
    fn unvoiced_agent_loses_timer() {
        let (config, store, mut allocator) = pass_fixture();
        let mut arena = AgentArena::with_capacity(4);
        let mut pool = GrainPool::new(64);
        let populations = [PopulationSettings::default(); MAX_POPULATIONS];
        arena.begin_update();
        arena.upsert(Agent {
            id: 1,
            velocity: 0.5,
            ..Agent::default()
        });
        arena.expire(|_, _| {});
        allocator.tick(0.0, &mut arena, &store, |_| {});

        let mut scheduler = GrainScheduler::new();
        let mut run = |allocator: &VoiceAllocator, arena: &mut AgentArena| {
            let pass = SchedulePass {
                frame: 0,
                sample_rate: 48_000.0,
                config: &config,
                store: &store,
                allocator,
                populations: &populations,
            };
            scheduler.run(&pass, arena, &mut pool, |_| {});
        };
        run(&allocator, &mut arena);
        assert!(arena.get_by_id(1).unwrap().timer.is_some());

        allocator.forget(0, 1);
        run(&allocator, &mut arena);
        assert!(arena.get_by_id(1).unwrap().timer.is_none());
    }
}
