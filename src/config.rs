//! Engine tunables and inline overrides.
//!
//! [`EngineConfig`] holds every constant the engine consults. Hosts may send
//! a [`ConfigPatch`] together with an agent snapshot to adjust a subset of
//! fields without rebuilding the engine. Non-finite patch values are ignored
//! and bounds are re-ordered after every patch, so a bad patch can never put
//! the render path into an invalid state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::filter::FrequencyMap;

/// Voice stealing delay bounds in milliseconds.
pub const STEALING_DELAY_RANGE_MS: (f32, f32) = (1.0, 500.0);
/// Voice stealing crossfade bounds in milliseconds.
pub const STEALING_CROSSFADE_RANGE_MS: (f32, f32) = (10.0, 500.0);

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // Grain timing
    /// Grain length in seconds at trail = 0.
    pub min_grain_length: f32,
    /// Grain length in seconds at trail = 1.
    pub max_grain_length: f32,
    /// Overlap factor (grains sounding at once per agent) at trail = 0.
    pub min_overlap: f32,
    /// Overlap factor at trail = 1.
    pub max_overlap: f32,
    /// Upper bound on spawn rate per agent, in grains per second.
    pub rate_cap: f32,
    /// Most grains one agent may spawn in one scheduling pass.
    pub max_spawns_per_update: usize,
    /// A timer further behind than this (seconds) is reset to now.
    pub drift_limit: f64,
    /// How far past the current time a scheduling pass may place grains.
    pub schedule_lookahead: f64,

    // Motion
    /// Normalized velocity around which audio gating toggles.
    pub velocity_threshold: f32,
    /// Exponent of the velocity → gain curve.
    pub velocity_gain_power: f32,

    // Envelope
    pub min_attack: f32,
    pub max_attack: f32,
    pub min_release: f32,
    pub max_release: f32,
    /// Gaussian window width as a fraction of grain duration.
    pub window_sigma: f32,
    /// Release time used when playback pauses.
    pub fast_release: f32,

    // Filter
    pub frequency: FrequencyMap,

    // Mixer
    /// Magnitude above which the soft limiter engages.
    pub limiter_threshold: f32,
    /// Meter fall-back time constant in seconds.
    pub meter_decay: f32,

    // Engine
    /// Maximum number of simultaneously active grains.
    pub pool_size: usize,
    /// Seconds of synthesized audio between voice allocation ticks.
    pub allocation_interval: f64,
    /// Seconds of synthesized audio between crossfade sweeps.
    pub sweep_interval: f64,
    /// Per-population voice ceiling before any `SetVoiceLimit`.
    pub default_max_voices: usize,
    pub voice_stealing_delay_ms: f32,
    pub voice_stealing_crossfade_ms: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_grain_length: 0.03,
            max_grain_length: 0.25,
            min_overlap: 1.0,
            max_overlap: 4.0,
            rate_cap: 40.0,
            max_spawns_per_update: 4,
            drift_limit: 0.5,
            schedule_lookahead: 0.02,

            velocity_threshold: 0.02,
            velocity_gain_power: 0.7,

            min_attack: 0.001,
            max_attack: 0.3,
            min_release: 0.008,
            max_release: 0.3,
            window_sigma: 0.3,
            fast_release: 0.01,

            frequency: FrequencyMap::default(),

            limiter_threshold: 0.8,
            meter_decay: 0.3,

            pool_size: 256,
            allocation_interval: 0.016,
            sweep_interval: 1.0,
            default_max_voices: 8,
            voice_stealing_delay_ms: 100.0,
            voice_stealing_crossfade_ms: 80.0,
        }
    }
}

/// Partial update of [`EngineConfig`]. `None` leaves a field unchanged.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigPatch {
    pub min_grain_length: Option<f32>,
    pub max_grain_length: Option<f32>,
    pub min_overlap: Option<f32>,
    pub max_overlap: Option<f32>,
    pub rate_cap: Option<f32>,
    pub velocity_threshold: Option<f32>,
    pub velocity_gain_power: Option<f32>,
    pub min_attack: Option<f32>,
    pub max_attack: Option<f32>,
    pub min_release: Option<f32>,
    pub max_release: Option<f32>,
    pub window_sigma: Option<f32>,
    pub min_frequency: Option<f32>,
    pub max_frequency: Option<f32>,
    pub frequency_gamma: Option<f32>,
    pub min_bandwidth_octaves: Option<f32>,
    pub max_bandwidth_octaves: Option<f32>,
    pub limiter_threshold: Option<f32>,
}

fn patch_field(target: &mut f32, value: Option<f32>, min: f32) {
    if let Some(value) = value.filter(|v| v.is_finite()) {
        *target = value.max(min);
    }
}

fn order(min: &mut f32, max: &mut f32) {
    if *min > *max {
        std::mem::swap(min, max);
    }
}

impl EngineConfig {
    /// Apply `patch`, then restore `min <= max` on every bound pair.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        patch_field(&mut self.min_grain_length, patch.min_grain_length, 1e-3);
        patch_field(&mut self.max_grain_length, patch.max_grain_length, 1e-3);
        patch_field(&mut self.min_overlap, patch.min_overlap, 0.1);
        patch_field(&mut self.max_overlap, patch.max_overlap, 0.1);
        patch_field(&mut self.rate_cap, patch.rate_cap, 0.1);
        patch_field(&mut self.velocity_threshold, patch.velocity_threshold, 0.0);
        patch_field(&mut self.velocity_gain_power, patch.velocity_gain_power, 0.0);
        patch_field(&mut self.min_attack, patch.min_attack, 1e-4);
        patch_field(&mut self.max_attack, patch.max_attack, 1e-4);
        patch_field(&mut self.min_release, patch.min_release, 1e-4);
        patch_field(&mut self.max_release, patch.max_release, 1e-4);
        patch_field(&mut self.window_sigma, patch.window_sigma, 0.01);
        patch_field(&mut self.frequency.min_hz, patch.min_frequency, 10.0);
        patch_field(&mut self.frequency.max_hz, patch.max_frequency, 10.0);
        patch_field(&mut self.frequency.gamma, patch.frequency_gamma, 0.01);
        patch_field(
            &mut self.frequency.min_bandwidth_octaves,
            patch.min_bandwidth_octaves,
            0.01,
        );
        patch_field(
            &mut self.frequency.max_bandwidth_octaves,
            patch.max_bandwidth_octaves,
            0.01,
        );
        if let Some(threshold) = patch.limiter_threshold.filter(|v| v.is_finite()) {
            self.limiter_threshold = threshold.clamp(0.1, 0.99);
        }

        order(&mut self.min_grain_length, &mut self.max_grain_length);
        order(&mut self.min_overlap, &mut self.max_overlap);
        order(&mut self.min_attack, &mut self.max_attack);
        order(&mut self.min_release, &mut self.max_release);
        order(&mut self.frequency.min_hz, &mut self.frequency.max_hz);
        order(
            &mut self.frequency.min_bandwidth_octaves,
            &mut self.frequency.max_bandwidth_octaves,
        );
    }
}

/// Clamp a voice stealing delay to its allowed range.
pub fn clamp_stealing_delay(ms: f32) -> f32 {
    let (min, max) = STEALING_DELAY_RANGE_MS;
    if ms.is_finite() {
        ms.clamp(min, max)
    } else {
        min
    }
}

/// Clamp a voice stealing crossfade to its allowed range.
pub fn clamp_stealing_crossfade(ms: f32) -> f32 {
    let (min, max) = STEALING_CROSSFADE_RANGE_MS;
    if ms.is_finite() {
        ms.clamp(min, max)
    } else {
        min
    }
}
