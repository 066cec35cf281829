//! Low-level DSP primitives used by the grain renderer and mixer.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! embed directly inside grain structs. They intentionally stay focused on the
//! signal-processing math so the engine can layer scheduling and voice
//! management on top.

/// Exponential-attack, Gaussian-window grain envelope with linear release.
pub mod envelope;
/// Cascaded one-pole band filter placed by agent position and size.
pub mod filter;
/// Cubic (Catmull-Rom) fractional reads with region wrapping.
pub mod interpolate;
/// Soft-knee limiter and peak meter.
pub mod limiter;
/// Equal-power fades, panning and polyphony normalization.
pub mod mix;

pub use envelope::{EnvelopeStage, GrainEnvelope};
pub use filter::{BandFilter, BandSpec, FrequencyMap};
