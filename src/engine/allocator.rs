//! Per-population voice allocation with delayed, crossfaded stealing.
//!
//! ```text
//!   Vocabulary
//!   ──────────
//!   ceiling    min(max voices, agents in the population)
//!   candidate  top `ceiling` agents by velocity (ties → lower id)
//!   pending    a candidate set that differs from the allocation and is
//!              waiting to prove itself stable
//!
//!   Rules, first match wins, evaluated every allocation tick
//!   ─────
//!   1. no sample loaded          → leave the population alone
//!   2. max voices ≥ agent count  → everyone is voiced, immediately
//!   3. allocation still empty    → commit the candidate, immediately
//!   4. max voices changed        → commit now, crossfading every change
//!   5. candidate ≠ allocation    → commit once it stayed identical for
//!                                  the stealing delay, crossfaded
//!
//!   Crossfade gain (equal power, p = progress 0..1)
//!   ──────────────
//!   in:  √p           out: √(1 − p)
//!
//!   A fade that is interrupted in the other direction starts from the
//!   gain it reached, not from the end of its curve:
//!     reversing into a fade-in at gain g     → p₀ = g²
//!     reversing into a fade-out at gain g    → p₀ = 1 − g²
//! ```

use crate::synth::{
    grain::VoiceGain,
    sample::{SampleStore, MAX_POPULATIONS},
};

use super::agents::AgentArena;

/// Tolerance when comparing elapsed engine time against a delay.
const TIME_EPSILON: f64 = 1e-9;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// A voice crossfade on one agent, in engine seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossfade {
    pub direction: FadeDirection,
    pub start_time: f64,
    pub duration: f64,
}

impl Crossfade {
    /// Start a fade in `direction` at `now`, continuing from wherever
    /// `current` had taken the gain.
    pub fn start(
        current: Option<&Crossfade>,
        direction: FadeDirection,
        now: f64,
        duration: f64,
    ) -> Self {
        let offset = match current {
            Some(fade) if fade.direction != direction && !fade.is_complete(now) => {
                let gain = fade.gain(now) as f64;
                match direction {
                    FadeDirection::In => gain * gain,
                    FadeDirection::Out => 1.0 - gain * gain,
                }
            }
            Some(fade) if fade.direction == direction => fade.progress(now) as f64,
            _ => 0.0,
        };
        Self {
            direction,
            start_time: now - offset * duration,
            duration,
        }
    }

    pub fn progress(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ((now - self.start_time) / self.duration).clamp(0.0, 1.0) as f32
    }

    pub fn gain(&self, now: f64) -> f32 {
        let p = self.progress(now);
        match self.direction {
            FadeDirection::In => p.sqrt(),
            FadeDirection::Out => (1.0 - p).sqrt(),
        }
    }

    pub fn is_complete(&self, now: f64) -> bool {
        now - self.start_time >= self.duration - TIME_EPSILON
    }

    /// Per-block voice gain for a block starting at `now`.
    pub fn voice_gain(&self, now: f64, sample_rate: f32) -> VoiceGain {
        if self.is_complete(now) {
            return VoiceGain::Constant(match self.direction {
                FadeDirection::In => 1.0,
                FadeDirection::Out => 0.0,
            });
        }
        let progress = self.progress(now);
        let step = (1.0 / (self.duration * sample_rate as f64)) as f32;
        match self.direction {
            FadeDirection::In => VoiceGain::FadeIn { progress, step },
            FadeDirection::Out => VoiceGain::FadeOut { progress, step },
        }
    }
}

/// Change to the voiced set reported by an allocation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationEvent {
    Granted { population: usize, agent: u32 },
    Revoked { population: usize, agent: u32 },
}

#[derive(Debug)]
pub struct PopulationVoices {
    max_voices: usize,
    /// Sorted agent ids currently holding a voice.
    allocated: Vec<u32>,
    /// Scratch for the candidate computed on each tick.
    candidate: Vec<u32>,
    pending: Vec<u32>,
    pending_since: Option<f64>,
    /// Voice limit seen by the previous tick.
    last_max_voices: Option<usize>,
}

impl PopulationVoices {
    fn new(max_voices: usize, capacity: usize) -> Self {
        Self {
            max_voices,
            allocated: Vec::with_capacity(capacity),
            candidate: Vec::with_capacity(capacity),
            pending: Vec::with_capacity(capacity),
            pending_since: None,
            last_max_voices: None,
        }
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    pub fn allocated(&self) -> &[u32] {
        &self.allocated
    }

    pub fn is_allocated(&self, agent: u32) -> bool {
        self.allocated.binary_search(&agent).is_ok()
    }

    pub fn pending_since(&self) -> Option<f64> {
        self.pending_since
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
        self.pending_since = None;
    }

    fn reset(&mut self) {
        self.allocated.clear();
        self.candidate.clear();
        self.clear_pending();
        self.last_max_voices = None;
    }
}

#[derive(Debug)]
pub struct VoiceAllocator {
    populations: [PopulationVoices; MAX_POPULATIONS],
    stealing_delay: f64,
    crossfade: f64,
    last_tick: Option<f64>,
    /// (velocity, id) scratch for ranking.
    ranking: Vec<(f32, u32)>,
}

impl VoiceAllocator {
    pub fn new(
        default_max_voices: usize,
        stealing_delay_ms: f32,
        crossfade_ms: f32,
        capacity: usize,
    ) -> Self {
        Self {
            populations: std::array::from_fn(|_| {
                PopulationVoices::new(default_max_voices, capacity)
            }),
            stealing_delay: stealing_delay_ms as f64 / 1000.0,
            crossfade: crossfade_ms as f64 / 1000.0,
            last_tick: None,
            ranking: Vec::with_capacity(capacity),
        }
    }

    pub fn population(&self, population: usize) -> Option<&PopulationVoices> {
        self.populations.get(population)
    }

    pub fn is_allocated(&self, population: usize, agent: u32) -> bool {
        self.populations
            .get(population)
            .is_some_and(|voices| voices.is_allocated(agent))
    }

    pub fn set_max_voices(&mut self, population: usize, max_voices: usize) {
        if let Some(voices) = self.populations.get_mut(population) {
            voices.max_voices = max_voices;
            self.last_tick = None;
        }
    }

    pub fn set_stealing_delay(&mut self, ms: f32) {
        self.stealing_delay = ms as f64 / 1000.0;
    }

    pub fn set_crossfade(&mut self, ms: f32) {
        self.crossfade = ms as f64 / 1000.0;
    }

    /// Whether a tick is due at `now` given `interval` seconds between ticks.
    pub fn is_due(&self, now: f64, interval: f64) -> bool {
        self.last_tick
            .is_none_or(|last| now - last >= interval - TIME_EPSILON)
    }

    /// Drop `agent` from a population without a fade. Used when the agent
    /// itself disappears, so nothing is left to fade.
    pub fn forget(&mut self, population: usize, agent: u32) {
        let Some(voices) = self.populations.get_mut(population) else {
            return;
        };
        if let Ok(index) = voices.allocated.binary_search(&agent) {
            voices.allocated.remove(index);
        }
        if voices.pending.binary_search(&agent).is_ok() {
            voices.clear_pending();
        }
    }

    /// Forget every allocation and pending decision.
    pub fn reset(&mut self) {
        for voices in &mut self.populations {
            voices.reset();
        }
        self.last_tick = None;
    }

    /// Run one allocation tick over every population.
    pub fn tick(
        &mut self,
        now: f64,
        arena: &mut AgentArena,
        store: &SampleStore,
        mut on_event: impl FnMut(AllocationEvent),
    ) {
        self.last_tick = Some(now);
        for population in 0..MAX_POPULATIONS {
            if !store.is_loaded(population) {
                continue;
            }
            self.tick_population(population, now, arena, &mut on_event);
        }
    }

    fn tick_population(
        &mut self,
        population: usize,
        now: f64,
        arena: &mut AgentArena,
        on_event: &mut impl FnMut(AllocationEvent),
    ) {
        self.ranking.clear();
        self.ranking.extend(
            arena
                .iter()
                .filter(|(_, state)| state.agent.population == population)
                .map(|(_, state)| (state.agent.velocity, state.id())),
        );
        let count = self.ranking.len();
        // Fastest first, lower id on ties.
        self.ranking
            .sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let voices = &mut self.populations[population];
        let ceiling = voices.max_voices.min(count);
        voices.candidate.clear();
        voices
            .candidate
            .extend(self.ranking.iter().take(ceiling).map(|&(_, id)| id));
        voices.candidate.sort_unstable();

        // Only the user's limit counts here; agents coming and going move the
        // ceiling too but must still wait out the stealing delay.
        let limit_changed = voices
            .last_max_voices
            .is_some_and(|last| last != voices.max_voices);
        voices.last_max_voices = Some(voices.max_voices);

        if voices.candidate == voices.allocated {
            voices.clear_pending();
            return;
        }

        let crossfade = if voices.max_voices >= count || voices.allocated.is_empty() {
            false
        } else if limit_changed {
            true
        } else {
            if voices.pending_since.is_none() || voices.pending != voices.candidate {
                voices.pending.clear();
                voices.pending.extend_from_slice(&voices.candidate);
                voices.pending_since = Some(now);
                return;
            }
            let since = voices.pending_since.unwrap_or(now);
            if now - since < self.stealing_delay - TIME_EPSILON {
                return;
            }
            true
        };

        commit(voices, population, now, self.crossfade, crossfade, arena, on_event);
    }
}

fn commit(
    voices: &mut PopulationVoices,
    population: usize,
    now: f64,
    duration: f64,
    crossfade: bool,
    arena: &mut AgentArena,
    on_event: &mut impl FnMut(AllocationEvent),
) {
    for &agent in &voices.candidate {
        if voices.allocated.binary_search(&agent).is_ok() {
            continue;
        }
        if let Some(state) = arena.get_by_id_mut(agent) {
            // A voice regained mid fade-out must climb back from where it is.
            let fading_out = state
                .crossfade
                .is_some_and(|fade| fade.direction == FadeDirection::Out);
            if crossfade || fading_out {
                state.crossfade = Some(Crossfade::start(
                    state.crossfade.as_ref(),
                    FadeDirection::In,
                    now,
                    duration,
                ));
            }
        }
        on_event(AllocationEvent::Granted { population, agent });
    }

    for &agent in &voices.allocated {
        if voices.candidate.binary_search(&agent).is_ok() {
            continue;
        }
        if crossfade {
            if let Some(state) = arena.get_by_id_mut(agent) {
                state.crossfade = Some(Crossfade::start(
                    state.crossfade.as_ref(),
                    FadeDirection::Out,
                    now,
                    duration,
                ));
            }
        }
        on_event(AllocationEvent::Revoked { population, agent });
    }

    std::mem::swap(&mut voices.allocated, &mut voices.candidate);
    voices.clear_pending();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::agents::Agent, synth::sample::SampleBuffer};

    fn store() -> SampleStore {
        let mut store = SampleStore::new();
        store.upload(
            0,
            Box::new(SampleBuffer::from_mono(48_000.0, vec![0.0; 64]).unwrap()),
        );
        store
    }

    fn snapshot(arena: &mut AgentArena, velocities: &[(u32, f32)]) {
        arena.begin_update();
        for &(id, velocity) in velocities {
            arena.upsert(Agent {
                id,
                velocity,
                ..Agent::default()
            });
        }
        arena.expire(|_, _| {});
    }

    fn tick(allocator: &mut VoiceAllocator, arena: &mut AgentArena, now: f64) -> Vec<AllocationEvent> {
        let mut events = Vec::new();
        allocator.tick(now, arena, &store(), |event| events.push(event));
        events
    }

    #[test]
    fn cold_start_grants_fastest_without_fades() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(2, 50.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.1), (2, 0.9), (3, 0.5), (4, 0.5)]);

        tick(&mut allocator, &mut arena, 0.0);

        assert_eq!(allocator.population(0).unwrap().allocated(), &[2, 3]);
        assert!(arena.iter().all(|(_, state)| state.crossfade.is_none()));
    }

    #[test]
    fn non_binding_ceiling_grants_everyone() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(8, 50.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.1), (2, 0.2), (3, 0.3)]);

        tick(&mut allocator, &mut arena, 0.0);
        assert_eq!(allocator.population(0).unwrap().allocated(), &[1, 2, 3]);

        snapshot(&mut arena, &[(1, 0.1), (2, 0.2), (3, 0.3), (4, 0.0)]);
        tick(&mut allocator, &mut arena, 0.016);
        assert!(allocator.is_allocated(0, 4));
        assert!(allocator.population(0).unwrap().pending_since().is_none());
    }

    #[test]
    fn steal_waits_for_stable_candidate() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(1, 50.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.9), (2, 0.1)]);
        tick(&mut allocator, &mut arena, 0.0);
        assert!(allocator.is_allocated(0, 1));

        snapshot(&mut arena, &[(1, 0.1), (2, 0.9)]);
        assert!(tick(&mut allocator, &mut arena, 0.016).is_empty());
        assert!(tick(&mut allocator, &mut arena, 0.048).is_empty());
        assert!(allocator.is_allocated(0, 1));

        let events = tick(&mut allocator, &mut arena, 0.066);
        assert!(allocator.is_allocated(0, 2));
        assert!(events.contains(&AllocationEvent::Granted {
            population: 0,
            agent: 2
        }));
        assert!(events.contains(&AllocationEvent::Revoked {
            population: 0,
            agent: 1
        }));

        let fade_in = arena.get_by_id(2).unwrap().crossfade.unwrap();
        let fade_out = arena.get_by_id(1).unwrap().crossfade.unwrap();
        assert_eq!(fade_in.direction, FadeDirection::In);
        assert_eq!(fade_out.direction, FadeDirection::Out);
    }

    #[test]
    fn changing_candidate_restarts_delay() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(1, 50.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.9), (2, 0.1), (3, 0.0)]);
        tick(&mut allocator, &mut arena, 0.0);

        snapshot(&mut arena, &[(1, 0.1), (2, 0.9), (3, 0.0)]);
        tick(&mut allocator, &mut arena, 0.016);
        snapshot(&mut arena, &[(1, 0.1), (2, 0.0), (3, 0.9)]);
        tick(&mut allocator, &mut arena, 0.048);
        assert_eq!(allocator.population(0).unwrap().pending_since(), Some(0.048));

        tick(&mut allocator, &mut arena, 0.080);
        assert!(allocator.is_allocated(0, 1));
        tick(&mut allocator, &mut arena, 0.098);
        assert!(allocator.is_allocated(0, 3));
    }

    #[test]
    fn ceiling_change_commits_immediately_with_fades() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(2, 500.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.9), (2, 0.5), (3, 0.1)]);
        tick(&mut allocator, &mut arena, 0.0);

        allocator.set_max_voices(0, 1);
        tick(&mut allocator, &mut arena, 0.001);

        assert_eq!(allocator.population(0).unwrap().allocated(), &[1]);
        let fade = arena.get_by_id(2).unwrap().crossfade.unwrap();
        assert_eq!(fade.direction, FadeDirection::Out);
    }

    #[test]
    fn growing_population_still_waits_for_delay() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(2, 100.0, 80.0, 16);
        snapshot(&mut arena, &[(1, 0.5)]);
        tick(&mut allocator, &mut arena, 0.0);
        assert_eq!(allocator.population(0).unwrap().allocated(), &[1]);

        // Two faster agents join; the limit itself never changes.
        snapshot(&mut arena, &[(1, 0.1), (2, 0.9), (3, 0.8)]);
        let mut now = 0.016;
        while now < 0.1 {
            tick(&mut allocator, &mut arena, now);
            assert!(allocator.is_allocated(0, 1), "voice stolen at {now}");
            now += 0.016;
        }
        tick(&mut allocator, &mut arena, 0.016 + 0.1);
        assert_eq!(allocator.population(0).unwrap().allocated(), &[2, 3]);
        assert_eq!(
            arena.get_by_id(1).unwrap().crossfade.map(|fade| fade.direction),
            Some(FadeDirection::Out)
        );
    }

    #[test]
    fn unloaded_population_is_untouched() {
        let mut arena = AgentArena::with_capacity(16);
        let mut allocator = VoiceAllocator::new(2, 50.0, 80.0, 16);
        arena.begin_update();
        arena.upsert(Agent {
            id: 1,
            population: 3,
            ..Agent::default()
        });
        arena.expire(|_, _| {});

        tick(&mut allocator, &mut arena, 0.0);
        assert!(!allocator.is_allocated(3, 1));
    }

    #[test]
    fn reversed_fade_starts_from_current_gain() {
        let out = Crossfade::start(None, FadeDirection::Out, 0.0, 0.1);
        let gain = out.gain(0.05);
        let back_in = Crossfade::start(Some(&out), FadeDirection::In, 0.05, 0.1);
        assert!((back_in.gain(0.05) - gain).abs() < 1e-5);
        assert!(!back_in.is_complete(0.05));
    }

    #[test]
    fn completed_fade_yields_constant_gain() {
        let fade = Crossfade::start(None, FadeDirection::Out, 0.0, 0.08);
        assert_eq!(fade.voice_gain(0.08, 48_000.0), VoiceGain::Constant(0.0));
        assert!(matches!(
            fade.voice_gain(0.04, 48_000.0),
            VoiceGain::FadeOut { .. }
        ));
    }
}
