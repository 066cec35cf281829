//! Soft limiting and level metering.
//!
//! The limiter is a safety net at the very end of the mix. Below the
//! threshold the signal passes untouched; above it, the excess is squeezed
//! through a `tanh` curve so the output approaches ±1 asymptotically instead
//! of hitting a hard wall.
//!
//! # Transfer Curve
//!
//!   |x| <= T:   y = x
//!   |x| >  T:   y = sign(x) × (T + (1 - T) × tanh((|x| - T) / (1 - T)))
//!
//! The curve is continuous with slope 1 at the knee, so samples that just
//! cross the threshold are not audibly bent.
//!
//! # Metering
//!
//! The meter holds the per-block peak and lets it fall back exponentially,
//! like the ballistics of a hardware peak meter. The host reads the level
//! for display only.

/// Soft-knee limit a single sample.
#[inline]
pub fn soft_limit(sample: f32, threshold: f32) -> f32 {
    let threshold = threshold.clamp(0.0, 0.999);
    let magnitude = sample.abs();
    if magnitude <= threshold {
        return sample;
    }
    let headroom = 1.0 - threshold;
    let shaped = threshold + headroom * ((magnitude - threshold) / headroom).tanh();
    shaped.copysign(sample)
}

/// Apply [`soft_limit`] to an entire buffer in place.
///
/// Returns the number of samples that crossed the threshold.
pub fn soft_limit_buffer(buffer: &mut [f32], threshold: f32) -> usize {
    let mut limited = 0;
    for sample in buffer.iter_mut() {
        if sample.abs() > threshold {
            limited += 1;
            *sample = soft_limit(*sample, threshold);
        }
    }
    limited
}

/// Peak meter with exponential fall-back.
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter {
    level: f32,
    /// Seconds for the level to fall to 1/e.
    decay_time: f32,
}

impl LevelMeter {
    pub fn new(decay_time: f32) -> Self {
        Self {
            level: 0.0,
            decay_time: decay_time.max(1e-3),
        }
    }

    /// Feed one block of samples covering `frames` frames.
    pub fn process(&mut self, block: &[f32], frames: usize, sample_rate: f32) -> f32 {
        let peak = block.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let decay = (-(frames as f32) / (self.decay_time * sample_rate)).exp();
        self.level = peak.max(self.level * decay);
        self.level
    }

    pub fn set_decay_time(&mut self, decay_time: f32) {
        self.decay_time = decay_time.max(1e-3);
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
