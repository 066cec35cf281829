//! The audio-thread side of the synth.
//!
//! [`GrainEngine`] owns every piece of mutable state: sample slots, agent
//! arena, voice allocator, grain pool and mixer. The host talks to it only
//! through a [`MessageReceiver`]; the engine answers through a
//! [`TelemetrySender`]. Nothing here blocks, locks, or allocates once the
//! engine is built, except for dropping buffers the host moved in.
//!
//! Time is the engine's own sample clock. Messages are applied at the start
//! of each block (the quantum), so every control change lands on a block
//! boundary.

pub mod agents;
pub mod allocator;
pub mod scheduler;

use std::time::Instant;

use log::{debug, warn};

use crate::{
    config::{clamp_stealing_crossfade, clamp_stealing_delay, EngineConfig},
    dsp::{
        limiter::{soft_limit_buffer, LevelMeter},
        mix::{polyphony_gain, scale_in_place, sum_in_place},
    },
    synth::{
        grain::{Grain, VoiceGain},
        message::{EngineMessage, MessageReceiver, Telemetry, TelemetrySender},
        pool::GrainPool,
        sample::{SampleStore, MAX_POPULATIONS},
    },
    MAX_BLOCK_SIZE,
};

use self::{
    agents::{Agent, AgentArena},
    allocator::{AllocationEvent, FadeDirection, VoiceAllocator},
    scheduler::{GrainScheduler, PopulationSettings, SchedulePass},
};

/// Agents the engine reserves bookkeeping space for up front.
pub const AGENT_CAPACITY: usize = 1024;

/// Smoothing applied to the load estimate per block.
const LOAD_SMOOTHING: f32 = 0.9;

pub struct GrainEngine<R: MessageReceiver, T: TelemetrySender> {
    sample_rate: f32,
    channels: usize,
    config: EngineConfig,
    store: SampleStore,
    arena: AgentArena,
    allocator: VoiceAllocator,
    scheduler: GrainScheduler,
    pool: GrainPool,
    populations: [PopulationSettings; MAX_POPULATIONS],
    meter: LevelMeter,
    frame: u64,
    last_sweep: u64,
    paused: bool,
    load: f32,
    rejected_agents: u64,
    left: Vec<f32>,
    right: Vec<f32>,
    rx: R,
    tx: T,
}

impl<R: MessageReceiver, T: TelemetrySender> GrainEngine<R, T> {
    pub fn new(sample_rate: f32, channels: usize, config: EngineConfig, rx: R, tx: T) -> Self {
        let delay = clamp_stealing_delay(config.voice_stealing_delay_ms);
        let crossfade = clamp_stealing_crossfade(config.voice_stealing_crossfade_ms);
        Self {
            sample_rate,
            channels: channels.max(1),
            store: SampleStore::new(),
            arena: AgentArena::with_capacity(AGENT_CAPACITY),
            allocator: VoiceAllocator::new(
                config.default_max_voices,
                delay,
                crossfade,
                AGENT_CAPACITY,
            ),
            scheduler: GrainScheduler::new(),
            pool: GrainPool::new(config.pool_size),
            populations: [PopulationSettings::default(); MAX_POPULATIONS],
            meter: LevelMeter::new(config.meter_decay),
            frame: 0,
            last_sweep: 0,
            paused: false,
            load: 0.0,
            rejected_agents: 0,
            left: vec![0.0; MAX_BLOCK_SIZE],
            right: vec![0.0; MAX_BLOCK_SIZE],
            config,
            rx,
            tx,
        }
    }

    /// Render interleaved audio for `output.len() / channels` frames.
    pub fn process_block(&mut self, output: &mut [f32]) {
        let channels = self.channels;
        for chunk in output.chunks_mut(MAX_BLOCK_SIZE * channels) {
            let started = Instant::now();
            let frames = chunk.len() / channels;

            self.drain_messages();
            self.tick_allocation();
            let active = self.render(frames);
            self.write_output(chunk, frames);
            self.sweep();

            self.frame += frames as u64;
            self.update_load(started, frames);
            self.tx.send(Telemetry::Meter {
                active_grains: active,
                level: self.meter.level(),
                dropped_grains: self.pool.dropped(),
                load: self.load,
            });
        }
    }

    fn drain_messages(&mut self) {
        while let Some(message) = self.rx.pop() {
            self.handle_message(message);
        }
    }

    fn handle_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::UploadSample { population, buffer } => {
                if population >= MAX_POPULATIONS {
                    warn!("Sample upload for population {population} ignored");
                    return;
                }
                debug!(
                    "Population {population}: loaded {:.2} s at {} Hz",
                    buffer.duration(),
                    buffer.sample_rate()
                );
                // Grains on the old buffer are dropped by the generation check.
                drop(self.store.upload(population, buffer));
                self.restart_timers(population);
            }
            EngineMessage::ClearSample { population } => {
                if self.store.clear(population).is_some() {
                    debug!("Population {population}: sample cleared");
                }
                self.restart_timers(population);
            }
            EngineMessage::UpdateAgents { agents, config } => {
                if let Some(patch) = config {
                    self.config.apply(&patch);
                    self.meter.set_decay_time(self.config.meter_decay);
                }
                if !self.paused {
                    self.ingest(&agents);
                }
            }
            EngineMessage::SetVoiceLimit {
                population,
                max_voices,
            } => {
                debug!("Population {population}: voice limit {max_voices}");
                self.allocator.set_max_voices(population, max_voices);
            }
            EngineMessage::SetMuted { muted } => {
                for (population, &mute) in muted.iter().enumerate() {
                    let settings = &mut self.populations[population];
                    if mute && !settings.muted {
                        self.pool.release_population(population, self.frame);
                    }
                    settings.muted = mute;
                }
            }
            EngineMessage::SetSampleRange {
                population,
                start,
                end,
            } => self.store.set_range(population, start, end),
            EngineMessage::SetVolume { population, gain } => {
                if let Some(settings) = self.populations.get_mut(population) {
                    if gain.is_finite() {
                        settings.volume = gain.max(0.0);
                    }
                }
            }
            EngineMessage::SetPitch {
                population,
                semitones,
            } => {
                if let Some(settings) = self.populations.get_mut(population) {
                    if semitones.is_finite() {
                        settings.pitch = semitones;
                    }
                }
            }
            EngineMessage::SetVoiceStealingDelay { ms } => {
                self.allocator.set_stealing_delay(clamp_stealing_delay(ms));
            }
            EngineMessage::SetVoiceStealingCrossfade { ms } => {
                self.allocator.set_crossfade(clamp_stealing_crossfade(ms));
            }
            EngineMessage::SetPaused(paused) => self.set_paused(paused),
        }
    }

    /// Drop the grain timers of `population` so the next pass spawns from now.
    fn restart_timers(&mut self, population: usize) {
        for (_, state) in self.arena.iter_mut() {
            if state.agent.population == population {
                state.timer = None;
            }
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if paused != self.paused {
            debug!("Engine {}", if paused { "paused" } else { "resumed" });
        }
        if paused && !self.paused {
            self.pool.release_all(self.frame, self.config.fast_release);
            self.arena.clear();
            self.allocator.reset();
        }
        self.paused = paused;
    }

    /// Apply one snapshot: refresh agents, purge orphans, then schedule.
    fn ingest(&mut self, agents: &[Agent]) {
        let frame = self.frame;
        let mut rejected = 0;

        self.arena.begin_update();
        for agent in agents {
            if agent.validate().is_err() {
                rejected += 1;
                continue;
            }
            let upsert = self.arena.upsert(*agent);
            if let Some(previous) = upsert.moved_from {
                self.allocator.forget(previous, agent.id);
                self.pool.release_agent(agent.id, frame);
            }
        }
        if rejected > 0 {
            self.rejected_agents += rejected;
            warn!("Dropped {rejected} invalid agent(s) from snapshot");
        }

        let allocator = &mut self.allocator;
        let pool = &mut self.pool;
        self.arena.expire(|_, state| {
            allocator.forget(state.agent.population, state.id());
            pool.release_agent(state.id(), frame);
        });

        self.tick_allocation();
        self.schedule();
    }

    fn tick_allocation(&mut self) {
        let now = self.time();
        if self.paused || !self.allocator.is_due(now, self.config.allocation_interval) {
            return;
        }
        let tx = &mut self.tx;
        self.allocator
            .tick(now, &mut self.arena, &self.store, |event| match event {
                AllocationEvent::Granted { population, agent } => {
                    tx.send(Telemetry::VoiceGranted { population, agent });
                }
                AllocationEvent::Revoked { population, agent } => {
                    tx.send(Telemetry::VoiceRevoked { population, agent });
                }
            });
    }

    fn schedule(&mut self) {
        let pass = SchedulePass {
            frame: self.frame,
            sample_rate: self.sample_rate,
            config: &self.config,
            store: &self.store,
            allocator: &self.allocator,
            populations: &self.populations,
        };
        let tx = &mut self.tx;
        self.scheduler
            .run(&pass, &mut self.arena, &mut self.pool, |telemetry| {
                tx.send(telemetry);
            });
    }

    /// Render every grain into the stereo scratch buffers. Returns how many
    /// grains produced audible output.
    fn render(&mut self, frames: usize) -> usize {
        let now = self.time();
        let left = &mut self.left[..frames];
        let right = &mut self.right[..frames];
        left.fill(0.0);
        right.fill(0.0);

        let store = &self.store;
        self.pool.retain(|grain| {
            store.generation(grain.population()) == Some(grain.generation())
                && store.is_loaded(grain.population())
        });

        let mut active = 0;
        for grain in self.pool.iter_mut() {
            let Some(region) = store.region(grain.population()) else {
                continue;
            };
            let voice = voice_gain(grain, &self.arena, &self.allocator, now, self.sample_rate);
            let silent = matches!(voice, VoiceGain::Constant(gain) if gain <= 0.0);
            // Silenced grains still run out their envelopes but do not count
            // towards normalization.
            if grain.render(&region, self.frame, voice, left, right) && !silent {
                active += 1;
            }
        }

        let gain = polyphony_gain(active);
        scale_in_place(left, gain);
        scale_in_place(right, gain);
        active
    }

    fn write_output(&mut self, chunk: &mut [f32], frames: usize) {
        let left = &self.left[..frames];
        let right = &self.right[..frames];
        match self.channels {
            1 => {
                chunk.copy_from_slice(left);
                sum_in_place(chunk, right);
                scale_in_place(chunk, std::f32::consts::FRAC_1_SQRT_2);
            }
            channels => {
                chunk.fill(0.0);
                for (frame, out) in chunk.chunks_exact_mut(channels).enumerate() {
                    out[0] = left[frame];
                    out[1] = right[frame];
                }
            }
        }
        soft_limit_buffer(chunk, self.config.limiter_threshold);
        self.meter.process(chunk, frames, self.sample_rate);
    }

    fn sweep(&mut self) {
        let interval = (self.config.sweep_interval * self.sample_rate as f64) as u64;
        if self.frame - self.last_sweep < interval {
            return;
        }
        self.last_sweep = self.frame;
        let now = self.time();
        for (_, state) in self.arena.iter_mut() {
            state.settle_crossfade(now);
        }
    }

    fn update_load(&mut self, started: Instant, frames: usize) {
        let budget = frames as f32 / self.sample_rate;
        if budget <= 0.0 {
            return;
        }
        let ratio = started.elapsed().as_secs_f32() / budget;
        self.load = self.load * LOAD_SMOOTHING + ratio * (1.0 - LOAD_SMOOTHING);
    }

    /// Engine time in seconds.
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_allocated(&self, population: usize, agent: u32) -> bool {
        self.allocator.is_allocated(population, agent)
    }

    /// Sorted ids holding a voice in `population`.
    pub fn allocation(&self, population: usize) -> &[u32] {
        self.allocator
            .population(population)
            .map_or(&[], |voices| voices.allocated())
    }

    pub fn voice_limit(&self, population: usize) -> Option<usize> {
        self.allocator
            .population(population)
            .map(|voices| voices.max_voices())
    }

    /// Direction and progress of an agent's running crossfade.
    pub fn crossfade_progress(&self, agent: u32) -> Option<(FadeDirection, f32)> {
        let now = self.time();
        let fade = self.arena.get_by_id(agent)?.crossfade?;
        Some((fade.direction, fade.progress(now)))
    }

    pub fn next_grain_time(&self, agent: u32) -> Option<f64> {
        Some(self.arena.get_by_id(agent)?.timer?.next_grain_time)
    }

    /// Whether any per-agent state survives for `agent`.
    pub fn has_agent_state(&self, agent: u32) -> bool {
        self.arena.get_by_id(agent).is_some()
    }

    pub fn is_audio_active(&self, agent: u32) -> bool {
        self.arena
            .get_by_id(agent)
            .is_some_and(|state| state.audio_active)
    }

    pub fn active_grain_count(&self) -> usize {
        self.pool.len()
    }

    pub fn grains(&self) -> impl Iterator<Item = &Grain> {
        self.pool.iter()
    }

    pub fn dropped_grains(&self) -> u64 {
        self.pool.dropped()
    }

    pub fn rejected_agents(&self) -> u64 {
        self.rejected_agents
    }

    /// Current meter level.
    pub fn level(&self) -> f32 {
        self.meter.level()
    }

    pub fn receiver_mut(&mut self) -> &mut R {
        &mut self.rx
    }

    pub fn telemetry_mut(&mut self) -> &mut T {
        &mut self.tx
    }
}

/// Voice gain for `grain` over the coming block.
///
/// Running fades drive the gain. Voiced agents play at unity, and agents
/// whose fade-out has finished stay at zero. Grains whose agent is gone or
/// has moved to another population hold the last gain they reached until
/// their release finishes.
fn voice_gain(
    grain: &Grain,
    arena: &AgentArena,
    allocator: &VoiceAllocator,
    now: f64,
    sample_rate: f32,
) -> VoiceGain {
    let hold = VoiceGain::Constant(grain.voice_gain());
    let Some(state) = arena.get_by_id(grain.agent()) else {
        return hold;
    };
    if state.agent.population != grain.population() {
        return hold;
    }
    match state.crossfade {
        Some(fade) => fade.voice_gain(now, sample_rate),
        None if allocator.is_allocated(grain.population(), grain.agent()) => {
            VoiceGain::Constant(1.0)
        }
        None => VoiceGain::Constant(0.0),
    }
}
