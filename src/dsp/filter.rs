use std::f32::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Adaptive Band Filter
====================

Every grain is shaped by its own band filter. The band is placed by the
agent's vertical position and widened by the agent's size, so a small agent
near the top of the field produces a thin, bright sliver of the sample while
a large agent near the bottom produces a broad, dark one.

Vocabulary
----------

  one-pole      The simplest recursive filter: one memory cell, one
                coefficient. Rolls off 6 dB per octave above its corner.

  stage         One one-pole section. Cascading N stages multiplies the
                slopes: 2 stages = 12 dB/oct, 4 stages = 24 dB/oct.

  band edges    The lower and upper corner frequencies. The band is centered
                (geometrically) on `fc` and spans `bandwidth` octaves.

  compensation  Narrow bands pass less energy than wide ones. A gain of
                sqrt(reference_bw / actual_bw) makes them sound equally loud.


Topology
--------

    input ──► LP ──► LP ──► ... ──► HP ──► HP ──► ... ──► × comp ──► out
              (at upper edge)        (at lower edge)

The highpass stages are built from the same one-pole lowpass:

    hp(x) = x - lp(x)

so a single state cell per stage is enough for both halves of the cascade.


The Math: Center Frequency
--------------------------

Vertical position y is normalized with 0 at the top. It is inverted so the
top of the field is bright:

    u  = 1 - y
    fc = f_min × (f_max / f_min) ^ (u ^ gamma)

A gamma above 1 spends more of the vertical range on low frequencies, where
the ear resolves pitch more finely.

    bandwidth_oct = lerp(bw_min, bw_max, size)
    f_low  = fc / 2^(bandwidth_oct / 2)
    f_high = fc × 2^(bandwidth_oct / 2)


The Math: One-Pole Coefficient
------------------------------

    a = 1 - e^(-2π × fc / sample_rate)
    y[n] = y[n-1] + a × (x[n] - y[n-1])
*/

/// Maximum number of cascaded stages per side of the band.
pub const MAX_STAGES: usize = 4;
/// Minimum number of cascaded stages per side of the band.
pub const MIN_STAGES: usize = 2;

const MIN_EDGE_HZ: f32 = 10.0;
const MAX_EDGE_RATIO: f32 = 0.45;

/// Mapping from agent position/size to a filter band.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyMap {
    /// Center frequency at the bottom of the field.
    pub min_hz: f32,
    /// Center frequency at the top of the field.
    pub max_hz: f32,
    /// Curve exponent applied to the inverted y position.
    pub gamma: f32,
    /// Bandwidth in octaves for the smallest agents.
    pub min_bandwidth_octaves: f32,
    /// Bandwidth in octaves for the largest agents.
    pub max_bandwidth_octaves: f32,
    /// Bandwidth that receives unity compensation gain.
    pub reference_bandwidth_hz: f32,
    /// Upper bound for the compensation gain.
    pub max_boost: f32,
}

impl Default for FrequencyMap {
    fn default() -> Self {
        Self {
            min_hz: 80.0,
            max_hz: 8_000.0,
            gamma: 1.6,
            min_bandwidth_octaves: 0.5,
            max_bandwidth_octaves: 3.0,
            reference_bandwidth_hz: 1_000.0,
            max_boost: 10.0,
        }
    }
}

/// Resolved band for one grain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    pub center_hz: f32,
    pub low_hz: f32,
    pub high_hz: f32,
    pub stages: usize,
    pub compensation: f32,
}

impl BandSpec {
    /// Resolve a band from normalized `y` (0 = top) and `size` (0..1).
    pub fn from_position(y: f32, size: f32, sample_rate: f32, map: &FrequencyMap) -> Self {
        let y = y.clamp(0.0, 1.0);
        let size = size.clamp(0.0, 1.0);

        let min_hz = map.min_hz.max(MIN_EDGE_HZ);
        let max_hz = map.max_hz.max(min_hz);
        let shaped = (1.0 - y).powf(map.gamma.max(0.01));
        let center_hz = min_hz * (max_hz / min_hz).powf(shaped);

        let bandwidth_octaves = lerp(
            map.min_bandwidth_octaves,
            map.max_bandwidth_octaves,
            size,
        )
        .max(0.01);
        let half_span = 2f32.powf(bandwidth_octaves * 0.5);

        let ceiling = sample_rate * MAX_EDGE_RATIO;
        let high_hz = (center_hz * half_span).clamp(MIN_EDGE_HZ * 2.0, ceiling);
        let mut low_hz = (center_hz / half_span).max(MIN_EDGE_HZ);
        if low_hz >= high_hz {
            low_hz = high_hz * 0.5;
        }

        let stages = (MAX_STAGES as f32 - (MAX_STAGES - MIN_STAGES) as f32 * size).round() as usize;

        let actual_bandwidth_hz = high_hz - low_hz;
        let compensation = (map.reference_bandwidth_hz / actual_bandwidth_hz)
            .sqrt()
            .min(map.max_boost);

        Self {
            center_hz,
            low_hz,
            high_hz,
            stages: stages.clamp(MIN_STAGES, MAX_STAGES),
            compensation,
        }
    }
}

/// A single one-pole section.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePole {
    z: f32,
}

impl OnePole {
    pub fn coefficient(cutoff_hz: f32, sample_rate: f32) -> f32 {
        1.0 - (-TAU * cutoff_hz / sample_rate).exp()
    }

    #[inline]
    pub fn lowpass(&mut self, sample: f32, a: f32) -> f32 {
        self.z += a * (sample - self.z);
        self.z
    }

    #[inline]
    pub fn highpass(&mut self, sample: f32, a: f32) -> f32 {
        sample - self.lowpass(sample, a)
    }

    pub fn reset(&mut self) {
        self.z = 0.0;
    }
}

/// Cascaded lowpass + highpass band filter with per-instance state.
#[derive(Debug, Clone, Copy)]
pub struct BandFilter {
    lowpass: [OnePole; MAX_STAGES],
    highpass: [OnePole; MAX_STAGES],
    lp_coeff: f32,
    hp_coeff: f32,
    stages: usize,
    compensation: f32,
}

impl BandFilter {
    pub fn new(spec: &BandSpec, sample_rate: f32) -> Self {
        Self {
            lowpass: [OnePole::default(); MAX_STAGES],
            highpass: [OnePole::default(); MAX_STAGES],
            lp_coeff: OnePole::coefficient(spec.high_hz, sample_rate),
            hp_coeff: OnePole::coefficient(spec.low_hz, sample_rate),
            stages: spec.stages.clamp(MIN_STAGES, MAX_STAGES),
            compensation: spec.compensation,
        }
    }

    #[inline]
    pub fn next_sample(&mut self, sample: f32) -> f32 {
        let mut x = sample;
        for stage in &mut self.lowpass[..self.stages] {
            x = stage.lowpass(x, self.lp_coeff);
        }
        for stage in &mut self.highpass[..self.stages] {
            x = stage.highpass(x, self.hp_coeff);
        }
        x * self.compensation
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }

    pub fn stages(&self) -> usize {
        self.stages
    }

    pub fn reset(&mut self) {
        for stage in self.lowpass.iter_mut().chain(self.highpass.iter_mut()) {
            stage.reset();
        }
    }
}

#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
