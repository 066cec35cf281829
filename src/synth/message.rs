//! Control and telemetry messages between the host and the audio thread.
//!
//! Both directions travel over lock-free SPSC ring buffers. Anything that
//! owns heap memory (sample buffers, agent snapshots) is allocated by the
//! host and moved through the channel; the engine only ever drops it.

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer, RingBuffer};

use std::collections::VecDeque;

use crate::{
    config::ConfigPatch,
    engine::{agents::Agent, allocator::FadeDirection},
    synth::sample::{SampleBuffer, MAX_POPULATIONS},
};

#[cfg(feature = "rtrb")]
use crate::error::Error;

#[derive(Debug)]
pub enum EngineMessage {
    UploadSample {
        population: usize,
        buffer: Box<SampleBuffer>,
    },
    ClearSample {
        population: usize,
    },
    /// Full agent snapshot with an optional config override.
    UpdateAgents {
        agents: Vec<Agent>,
        config: Option<Box<ConfigPatch>>,
    },
    SetVoiceLimit {
        population: usize,
        max_voices: usize,
    },
    /// Replace the set of muted populations.
    SetMuted {
        muted: [bool; MAX_POPULATIONS],
    },
    SetSampleRange {
        population: usize,
        start: f32,
        end: f32,
    },
    SetVolume {
        population: usize,
        gain: f32,
    },
    SetPitch {
        population: usize,
        semitones: f32,
    },
    SetVoiceStealingDelay {
        ms: f32,
    },
    SetVoiceStealingCrossfade {
        ms: f32,
    },
    SetPaused(bool),
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<EngineMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<EngineMessage> {
    fn pop(&mut self) -> Option<EngineMessage> {
        Consumer::pop(self).ok()
    }
}

/// Offline rendering and tests drive the engine from a plain queue.
impl MessageReceiver for VecDeque<EngineMessage> {
    fn pop(&mut self) -> Option<EngineMessage> {
        self.pop_front()
    }
}

/// State reported back from the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    /// Sent once per processed block.
    Meter {
        active_grains: usize,
        level: f32,
        dropped_grains: u64,
        /// Render time over block duration, smoothed.
        load: f32,
    },
    VoiceGranted {
        population: usize,
        agent: u32,
    },
    VoiceRevoked {
        population: usize,
        agent: u32,
    },
    Crossfade {
        population: usize,
        agent: u32,
        direction: FadeDirection,
        progress: f32,
    },
}

pub trait TelemetrySender {
    /// Returns `false` if the message was dropped.
    fn send(&mut self, telemetry: Telemetry) -> bool;
}

#[cfg(feature = "rtrb")]
impl TelemetrySender for Producer<Telemetry> {
    fn send(&mut self, telemetry: Telemetry) -> bool {
        self.push(telemetry).is_ok()
    }
}

impl TelemetrySender for Vec<Telemetry> {
    fn send(&mut self, telemetry: Telemetry) -> bool {
        self.push(telemetry);
        true
    }
}

/// Discards all telemetry.
impl TelemetrySender for () {
    fn send(&mut self, _telemetry: Telemetry) -> bool {
        true
    }
}

/// Host side of the engine's channels.
#[cfg(feature = "rtrb")]
pub struct EngineHandle {
    tx: Producer<EngineMessage>,
    telemetry: Consumer<Telemetry>,
}

/// Create both channels. The consumer and producer go to the engine.
#[cfg(feature = "rtrb")]
pub fn channels(
    capacity: usize,
) -> (EngineHandle, Consumer<EngineMessage>, Producer<Telemetry>) {
    let (tx, rx) = RingBuffer::new(capacity);
    let (telemetry_tx, telemetry_rx) = RingBuffer::new(capacity * 4);
    (
        EngineHandle {
            tx,
            telemetry: telemetry_rx,
        },
        rx,
        telemetry_tx,
    )
}

#[cfg(feature = "rtrb")]
impl EngineHandle {
    pub fn send(&mut self, message: EngineMessage) -> Result<(), Error> {
        self.tx.push(message).map_err(|_| Error::ChannelFull)
    }

    pub fn upload_sample(&mut self, population: usize, buffer: SampleBuffer) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::UploadSample {
            population,
            buffer: Box::new(buffer),
        })
    }

    pub fn clear_sample(&mut self, population: usize) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::ClearSample { population })
    }

    /// Send a snapshot. Invalid entries are filtered by the engine.
    pub fn update_agents(
        &mut self,
        agents: Vec<Agent>,
        config: Option<ConfigPatch>,
    ) -> Result<(), Error> {
        self.send(EngineMessage::UpdateAgents {
            agents,
            config: config.map(Box::new),
        })
    }

    pub fn set_voice_limit(&mut self, population: usize, max_voices: usize) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::SetVoiceLimit {
            population,
            max_voices,
        })
    }

    /// Mute exactly the listed populations.
    pub fn set_muted(&mut self, populations: &[usize]) -> Result<(), Error> {
        let mut muted = [false; MAX_POPULATIONS];
        for &population in populations {
            check_population(population)?;
            muted[population] = true;
        }
        self.send(EngineMessage::SetMuted { muted })
    }

    pub fn set_sample_range(&mut self, population: usize, start: f32, end: f32) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::SetSampleRange {
            population,
            start,
            end,
        })
    }

    pub fn set_volume(&mut self, population: usize, gain: f32) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::SetVolume { population, gain })
    }

    pub fn set_pitch(&mut self, population: usize, semitones: f32) -> Result<(), Error> {
        check_population(population)?;
        self.send(EngineMessage::SetPitch {
            population,
            semitones,
        })
    }

    pub fn set_voice_stealing_delay(&mut self, ms: f32) -> Result<(), Error> {
        self.send(EngineMessage::SetVoiceStealingDelay { ms })
    }

    pub fn set_voice_stealing_crossfade(&mut self, ms: f32) -> Result<(), Error> {
        self.send(EngineMessage::SetVoiceStealingCrossfade { ms })
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<(), Error> {
        self.send(EngineMessage::SetPaused(paused))
    }

    pub fn poll_telemetry(&mut self) -> Option<Telemetry> {
        self.telemetry.pop().ok()
    }
}

#[cfg(feature = "rtrb")]
fn check_population(population: usize) -> Result<(), Error> {
    if population < MAX_POPULATIONS {
        Ok(())
    } else {
        Err(Error::PopulationOutOfRange(population))
    }
}
