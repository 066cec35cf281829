//! A single grain: one windowed, filtered, panned read of a sample.
//!
//! Grains are plain `Copy` structs living in a preallocated pool. All state a
//! grain needs while rendering (read head, envelope, filter memory) is owned
//! by the grain itself, so grains never share mutable state.

use crate::dsp::{
    envelope::GrainEnvelope,
    filter::{BandFilter, BandSpec, FrequencyMap},
    interpolate::{cubic_wrapped, wrap_position},
    mix::{equal_power_pan, fade_in_gain, fade_out_gain},
};

use super::sample::SampleRegion;

/// Everything the scheduler resolves when it decides to spawn a grain.
#[derive(Debug, Clone, Copy)]
pub struct GrainParams {
    pub agent: u32,
    pub population: usize,
    /// Engine sample clock at which the grain starts sounding.
    pub start_frame: u64,
    /// Nominal duration in seconds (attack and window span this).
    pub duration: f32,
    pub attack: f32,
    pub release: f32,
    /// Base gain: population volume × velocity curve × agent gain scale.
    pub gain: f32,
    /// Normalized position and size of the agent at spawn.
    pub x: f32,
    pub y: f32,
    pub size: f32,
    /// Absolute source frame the grain is centered on.
    pub center: f64,
    /// Source frames advanced per output sample.
    pub playback_rate: f64,
    /// Generation of the sample slot the grain reads from.
    pub generation: u32,
}

/// Per-block voice gain applied on top of the grain's own envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceGain {
    Constant(f32),
    /// Equal-power fade-in, `progress` at the first frame of the block.
    FadeIn { progress: f32, step: f32 },
    /// Equal-power fade-out, `progress` at the first frame of the block.
    FadeOut { progress: f32, step: f32 },
}

impl VoiceGain {
    #[inline]
    pub fn at(&self, frame: usize) -> f32 {
        match *self {
            VoiceGain::Constant(gain) => gain,
            VoiceGain::FadeIn { progress, step } => fade_in_gain(progress + step * frame as f32),
            VoiceGain::FadeOut { progress, step } => {
                fade_out_gain(progress + step * frame as f32)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Grain {
    id: u64,
    agent: u32,
    population: usize,
    generation: u32,
    start_frame: u64,
    release_frame: Option<u64>,
    position: f64,
    rate: f64,
    gain: f32,
    pan: (f32, f32),
    voice_gain: f32,
    envelope: GrainEnvelope,
    filter: BandFilter,
}

impl Grain {
    pub fn new(
        id: u64,
        params: &GrainParams,
        window_sigma: f32,
        frequency: &FrequencyMap,
        sample_rate: f32,
    ) -> Self {
        let band = BandSpec::from_position(params.y, params.size, sample_rate, frequency);
        let span = params.duration as f64 * sample_rate as f64 * params.playback_rate;

        Self {
            id,
            agent: params.agent,
            population: params.population,
            generation: params.generation,
            start_frame: params.start_frame,
            release_frame: None,
            position: params.center - span * 0.5,
            rate: params.playback_rate,
            gain: params.gain,
            pan: equal_power_pan(params.x),
            voice_gain: 1.0,
            envelope: GrainEnvelope::new(
                params.duration,
                params.attack,
                params.release,
                window_sigma,
                sample_rate,
            ),
            filter: BandFilter::new(&band, sample_rate),
        }
    }

    /// Render into the stereo accumulation buffers for the block starting at
    /// `block_start`. Returns `true` if the grain produced any samples.
    pub fn render(
        &mut self,
        region: &SampleRegion,
        block_start: u64,
        voice: VoiceGain,
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        debug_assert_eq!(left.len(), right.len());

        if !self.envelope.is_active() {
            return false;
        }
        let frames = left.len();
        let first = self.start_frame.saturating_sub(block_start);
        if first >= frames as u64 {
            return false;
        }

        let (pan_l, pan_r) = self.pan;
        for i in first as usize..frames {
            if !self.envelope.is_active() {
                break;
            }
            let env = self.envelope.next_sample();
            let voice_gain = voice.at(i);
            self.voice_gain = voice_gain;

            let source = cubic_wrapped(region.samples, region.start, region.end, self.position);
            let sample = self.filter.next_sample(source * env * self.gain * voice_gain);

            left[i] += sample * pan_l;
            right[i] += sample * pan_r;

            self.position += self.rate;
        }
        self.position = wrap_position(self.position, region.start, region.end);
        true
    }

    /// Start the release at `frame` with the grain's own release time.
    pub fn release(&mut self, frame: u64) {
        if self.release_frame.is_none() {
            self.release_frame = Some(frame);
        }
        self.envelope.release();
    }

    /// Start (or shorten) the release with a forced `release` time.
    pub fn release_fast(&mut self, frame: u64, release: f32) {
        if self.release_frame.is_none() {
            self.release_frame = Some(frame);
        }
        self.envelope.release_with(release);
    }

    pub fn is_finished(&self) -> bool {
        !self.envelope.is_active()
    }

    pub fn is_releasing(&self) -> bool {
        self.release_frame.is_some() || self.envelope.is_releasing()
    }

    /// Whether the grain has reached its start frame by `frame`.
    pub fn has_started(&self, frame: u64) -> bool {
        frame >= self.start_frame
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn agent(&self) -> u32 {
        self.agent
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn release_frame(&self) -> Option<u64> {
        self.release_frame
    }

    /// Voice gain applied to the most recent sample.
    pub fn voice_gain(&self) -> f32 {
        self.voice_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::sample::{SampleBuffer, SampleStore};

    const SAMPLE_RATE: f32 = 48_000.0;

    fn store_with_noise() -> SampleStore {
        let samples = (0..48_000)
            .map(|i| ((i * 7919) % 2000) as f32 / 1000.0 - 1.0)
            .collect();
        let mut store = SampleStore::new();
        store.upload(0, Box::new(SampleBuffer::from_mono(SAMPLE_RATE, samples).unwrap()));
        store
    }

    fn params(start_frame: u64, x: f32) -> GrainParams {
        GrainParams {
            agent: 1,
            population: 0,
            start_frame,
            duration: 0.05,
            attack: 0.005,
            release: 0.01,
            gain: 1.0,
            x,
            y: 0.5,
            size: 0.5,
            center: 24_000.0,
            playback_rate: 1.0,
            generation: 1,
        }
    }

    fn render_all(grain: &mut Grain, store: &SampleStore, blocks: usize) -> (Vec<f32>, Vec<f32>) {
        let region = store.region(0).unwrap();
        let mut left = vec![0.0; 128 * blocks];
        let mut right = vec![0.0; 128 * blocks];
        for block in 0..blocks {
            let range = block * 128..(block + 1) * 128;
            let (l, r) = (&mut left[range.clone()], &mut right[range]);
            grain.render(&region, (block * 128) as u64, VoiceGain::Constant(1.0), l, r);
        }
        (left, right)
    }

    #[test]
    fn grain_finishes_after_duration_and_release() {
        let store = store_with_noise();
        let mut grain = Grain::new(1, &params(0, 0.5), 0.3, &FrequencyMap::default(), SAMPLE_RATE);

        // 50 ms + 10 ms release = 2880 samples, 23 blocks of 128 cover it.
        let (left, _) = render_all(&mut grain, &store, 23);
        assert!(grain.is_finished());
        assert!(left.iter().any(|s| s.abs() > 0.0));
        assert!(left[2_900..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn late_start_leaves_leading_frames_silent() {
        let store = store_with_noise();
        let mut grain = Grain::new(1, &params(64, 0.5), 0.3, &FrequencyMap::default(), SAMPLE_RATE);
        let (left, _) = render_all(&mut grain, &store, 1);
        assert!(left[..65].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn hard_left_pan_silences_right() {
        let store = store_with_noise();
        let mut grain = Grain::new(1, &params(0, 0.0), 0.3, &FrequencyMap::default(), SAMPLE_RATE);
        let (left, right) = render_all(&mut grain, &store, 8);
        assert!(left.iter().any(|s| s.abs() > 0.0));
        assert!(right.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn fade_out_voice_gain_reaches_zero() {
        let gain = VoiceGain::FadeOut {
            progress: 0.5,
            step: 0.01,
        };
        assert!((gain.at(0) - 0.5f32.sqrt()).abs() < 1e-6);
        assert_eq!(gain.at(50), 0.0);
        assert_eq!(gain.at(500), 0.0);
    }

    #[test]
    fn release_records_onset_once() {
        let mut grain = Grain::new(1, &params(0, 0.5), 0.3, &FrequencyMap::default(), SAMPLE_RATE);
        grain.release(100);
        grain.release_fast(200, 0.001);
        assert_eq!(grain.release_frame(), Some(100));
        assert!(grain.is_releasing());
    }
}
