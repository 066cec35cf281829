//! Per-population sample storage.
//!
//! Buffers are built (and validated) on the host side, then moved into the
//! engine where they are never mutated again. Each population owns one slot.
//! Replacing or clearing a slot bumps its generation so grains that were
//! reading the old buffer can tell they must stop.

use crate::error::Error;

/// Number of population slots in the store.
pub const MAX_POPULATIONS: usize = 8;

/// Decoded, immutable multi-channel sample data.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    /// Equal-weight mixdown of all channels; what grains actually read.
    mono: Vec<f32>,
    sample_rate: f32,
}

impl SampleBuffer {
    /// Build a buffer from planar channel data.
    pub fn new(sample_rate: f32, channels: Vec<Vec<f32>>) -> Result<Self, Error> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidSample(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        let Some(first) = channels.first() else {
            return Err(Error::InvalidSample("no channels".into()));
        };
        let len = first.len();
        if len == 0 {
            return Err(Error::InvalidSample("no frames".into()));
        }
        if channels.iter().any(|c| c.len() != len) {
            return Err(Error::InvalidSample("channel lengths differ".into()));
        }

        let weight = 1.0 / channels.len() as f32;
        let mut mono = vec![0.0; len];
        for channel in &channels {
            for (m, &s) in mono.iter_mut().zip(channel) {
                *m += s * weight;
            }
        }
        // Non-finite input would poison every grain reading it.
        for m in mono.iter_mut() {
            if !m.is_finite() {
                *m = 0.0;
            }
        }

        Ok(Self {
            channels,
            mono,
            sample_rate,
        })
    }

    /// Build a buffer whose declared `length` must match every channel.
    pub fn with_length(
        sample_rate: f32,
        length: usize,
        channels: Vec<Vec<f32>>,
    ) -> Result<Self, Error> {
        if channels.iter().any(|c| c.len() != length) {
            return Err(Error::InvalidSample(format!(
                "declared length {length} does not match channel data"
            )));
        }
        Self::new(sample_rate, channels)
    }

    pub fn from_mono(sample_rate: f32, samples: Vec<f32>) -> Result<Self, Error> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn len(&self) -> usize {
        self.mono.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mono.is_empty()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn mono(&self) -> &[f32] {
        &self.mono
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate
    }
}

#[derive(Debug)]
struct Slot {
    buffer: Option<Box<SampleBuffer>>,
    generation: u32,
    /// Normalized playback region.
    range: (f32, f32),
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            buffer: None,
            generation: 0,
            range: (0.0, 1.0),
        }
    }
}

/// Loaded sample region for one population.
#[derive(Debug, Clone, Copy)]
pub struct SampleRegion<'a> {
    pub samples: &'a [f32],
    pub start: usize,
    pub end: usize,
    pub sample_rate: f32,
    pub generation: u32,
}

impl SampleRegion<'_> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Absolute frame for normalized position `t` inside the region.
    pub fn frame_at(&self, t: f32) -> f64 {
        self.start as f64 + t.clamp(0.0, 1.0) as f64 * self.len() as f64
    }
}

/// Fixed table of one sample buffer per population.
#[derive(Debug, Default)]
pub struct SampleStore {
    slots: [Slot; MAX_POPULATIONS],
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `buffer`, returning the previous one.
    pub fn upload(
        &mut self,
        population: usize,
        buffer: Box<SampleBuffer>,
    ) -> Option<Box<SampleBuffer>> {
        let slot = self.slots.get_mut(population)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.buffer.replace(buffer)
    }

    /// Unload a population's buffer, returning it.
    pub fn clear(&mut self, population: usize) -> Option<Box<SampleBuffer>> {
        let slot = self.slots.get_mut(population)?;
        let old = slot.buffer.take();
        if old.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        old
    }

    /// Restrict playback to `[start, end]` (normalized). Reversed bounds are swapped.
    pub fn set_range(&mut self, population: usize, start: f32, end: f32) {
        let Some(slot) = self.slots.get_mut(population) else {
            return;
        };
        if !(start.is_finite() && end.is_finite()) {
            return;
        }
        let (a, b) = (start.clamp(0.0, 1.0), end.clamp(0.0, 1.0));
        slot.range = if a <= b { (a, b) } else { (b, a) };
    }

    pub fn range(&self, population: usize) -> Option<(f32, f32)> {
        self.slots.get(population).map(|s| s.range)
    }

    pub fn get(&self, population: usize) -> Option<&SampleBuffer> {
        self.slots.get(population)?.buffer.as_deref()
    }

    pub fn is_loaded(&self, population: usize) -> bool {
        self.get(population).is_some()
    }

    pub fn generation(&self, population: usize) -> Option<u32> {
        self.slots.get(population).map(|s| s.generation)
    }

    /// The playable region of a loaded buffer. A degenerate range falls back
    /// to at least one frame so grains always have something to read.
    pub fn region(&self, population: usize) -> Option<SampleRegion<'_>> {
        let slot = self.slots.get(population)?;
        let buffer = slot.buffer.as_deref()?;
        let len = buffer.len();
        let start = ((slot.range.0 * len as f32) as usize).min(len - 1);
        let end = ((slot.range.1 * len as f32).ceil() as usize).clamp(start + 1, len);
        Some(SampleRegion {
            samples: buffer.mono(),
            start,
            end,
            sample_rate: buffer.sample_rate(),
            generation: slot.generation,
        })
    }
}
