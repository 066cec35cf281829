/*
Grain Envelope
==============

A grain's amplitude follows two shapes in sequence: a shaped body while it
plays, then a straight release ramp once it has been told to stop.

Vocabulary
----------

  attack      Exponential ramp from 0 towards 1. It reaches ~98% of full
              level when `attack` seconds have elapsed.

  window      A Gaussian bell over the grain's progress (0 at start, 1 at
              its nominal duration). This is what gives a grain its soft,
              "grainy" outline.

  release     A linear ramp from whatever level the envelope had when the
              release began, down to zero over `release` seconds.

  sigma       Width of the Gaussian, as a fraction of the grain duration.


The Shape
---------

  Level
    1.0 ┐        ___
        │      ╱     ╲
        │     ╱       ╲
        │    ╱         ╲__
        │   ╱             ╲  ← release (linear)
    0.0 └──╱───────────────╲──→ Time
          attack × window   release

The body is

    attack(t) = 1 - e^(-4 × t / attack)
    window(p) = e^(-0.5 × ((p - 0.5) / sigma)²)
    level     = attack(t) × window(t / duration)

The release starts by itself when the grain reaches its nominal duration,
or earlier when the voice is lost or playback pauses. Release is always
taken from the CURRENT level so it never jumps.


Implementation Notes
--------------------

Time is tracked in whole samples so the release lasts an exact number of
samples: `round(release × sample_rate)`. The level is computed fresh from the
elapsed sample count rather than accumulated, so long grains do not drift.
*/

/// e^-4 ≈ 0.018, so the attack ramp is at ~98% when `attack` has elapsed.
const ATTACK_SHAPE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Attack ramp times the Gaussian window.
    Body,
    /// Linear ramp to zero from the level at release onset.
    Release,
    /// Release completed, level is zero.
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct GrainEnvelope {
    sample_rate: f32,
    attack: f32,
    duration: f32,
    sigma: f32,
    release_samples: u32,

    stage: EnvelopeStage,
    level: f32,
    elapsed_samples: u32,
    duration_samples: u32,

    release_start_level: f32,
    release_total_samples: u32,
    release_elapsed_samples: u32,
}

impl GrainEnvelope {
    pub fn new(duration: f32, attack: f32, release: f32, sigma: f32, sample_rate: f32) -> Self {
        let duration = duration.max(1.0 / sample_rate);
        Self {
            sample_rate,
            attack: attack.max(1.0 / sample_rate),
            duration,
            sigma: sigma.max(0.01),
            release_samples: Self::seconds_to_samples(release, sample_rate),

            stage: EnvelopeStage::Body,
            level: 0.0,
            elapsed_samples: 0,
            duration_samples: Self::seconds_to_samples(duration, sample_rate),

            release_start_level: 0.0,
            release_total_samples: 1,
            release_elapsed_samples: 0,
        }
    }

    fn seconds_to_samples(seconds: f32, sample_rate: f32) -> u32 {
        (seconds * sample_rate).round().max(1.0) as u32
    }

    fn body_level(&self, elapsed_samples: u32) -> f32 {
        let t = elapsed_samples as f32 / self.sample_rate;
        let attack = 1.0 - (-ATTACK_SHAPE * t / self.attack).exp();
        let progress = (t / self.duration).min(1.0);
        let offset = (progress - 0.5) / self.sigma;
        let window = (-0.5 * offset * offset).exp();
        attack * window
    }

    /// Begin the release with the envelope's own release time.
    pub fn release(&mut self) {
        let samples = self.release_samples;
        self.begin_release(samples);
    }

    /// Begin the release with an explicit (usually shorter) release time.
    pub fn release_with(&mut self, release: f32) {
        let samples = Self::seconds_to_samples(release, self.sample_rate);
        self.begin_release(samples.min(self.release_samples));
    }

    fn begin_release(&mut self, samples: u32) {
        match self.stage {
            EnvelopeStage::Body => {
                self.release_start_level = self.level;
            }
            // Already releasing: shorten the remaining ramp from the current level.
            EnvelopeStage::Release => {
                let remaining = self.release_total_samples - self.release_elapsed_samples;
                if samples >= remaining {
                    return;
                }
                self.release_start_level = self.level;
            }
            EnvelopeStage::Finished => return,
        }
        self.release_total_samples = samples.max(1);
        self.release_elapsed_samples = 0;
        self.stage = EnvelopeStage::Release;
    }

    /// Produce the level for the current sample and advance by one sample.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Body => {
                if self.elapsed_samples >= self.duration_samples {
                    self.release();
                    return self.next_sample();
                }
                self.level = self.body_level(self.elapsed_samples);
                self.elapsed_samples += 1;
            }
            EnvelopeStage::Release => {
                let progress =
                    self.release_elapsed_samples as f32 / self.release_total_samples as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);
                self.release_elapsed_samples += 1;
                if self.release_elapsed_samples > self.release_total_samples {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Finished;
                }
            }
            EnvelopeStage::Finished => {
                self.level = 0.0;
            }
        }
        self.level
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.stage, EnvelopeStage::Finished)
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self.stage, EnvelopeStage::Release)
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Samples still to be produced before the envelope finishes, if releasing.
    pub fn remaining_release_samples(&self) -> Option<u32> {
        self.is_releasing()
            .then(|| self.release_total_samples + 1 - self.release_elapsed_samples)
    }
}
