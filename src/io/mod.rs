// Purpose - planar buffers and offline rendering

use std::collections::VecDeque;

use crate::{
    engine::GrainEngine,
    synth::message::{EngineMessage, TelemetrySender},
};

/// Planar multi-channel audio.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AudioOutput {
    pub buffers: Vec<Vec<f32>>,
}

impl AudioOutput {
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            buffers: vec![vec![0.0; frames]; channels],
        }
    }

    /// Split interleaved samples into one buffer per channel.
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let mut output = Self::new(channels, frames);
        for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
            for (buffer, &sample) in output.buffers.iter_mut().zip(chunk) {
                buffer[frame] = sample;
            }
        }
        output
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    pub fn frames(&self) -> usize {
        self.buffers.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.buffers
            .iter()
            .flatten()
            .fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }

    pub fn rms(&self) -> f32 {
        let count = self.channels() * self.frames();
        if count == 0 {
            return 0.0;
        }
        let sum: f32 = self.buffers.iter().flatten().map(|&x| x * x).sum();
        (sum / count as f32).sqrt()
    }
}

/// Render `frames` frames from an engine fed by a plain queue, in blocks of
/// `block_size`. `between_blocks` runs before every block and may queue
/// messages, which the engine applies at that block's start.
pub fn render_offline<T: TelemetrySender>(
    engine: &mut GrainEngine<VecDeque<EngineMessage>, T>,
    frames: usize,
    block_size: usize,
    mut between_blocks: impl FnMut(usize, &mut VecDeque<EngineMessage>),
) -> AudioOutput {
    let channels = engine.channels();
    let block_size = block_size.max(1);
    let mut interleaved = vec![0.0; frames * channels];
    for (index, block) in interleaved.chunks_mut(block_size * channels).enumerate() {
        between_blocks(index, engine.receiver_mut());
        engine.process_block(block);
    }
    AudioOutput::from_interleaved(&interleaved, channels)
}
