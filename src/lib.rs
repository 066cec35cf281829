pub mod config; // Engine tunables and inline overrides
pub mod dsp; // Envelopes, filters, interpolation, limiting
pub mod engine; // Agent bookkeeping, voice allocation, grain scheduling
pub mod error;
pub mod io; // Planar buffers and offline rendering
pub mod synth; // Samples, grains and control messages

pub use error::Error;

/// Largest block the engine renders in one pass. Longer host buffers are split.
pub const MAX_BLOCK_SIZE: usize = 2048;
