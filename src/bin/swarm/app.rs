//! Swarm - application builder and runner

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use log::{error, info, LevelFilter};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rtrb::RingBuffer;

use swarm_grains::{
    config::EngineConfig,
    engine::GrainEngine,
    synth::{message::channels, sample::SampleBuffer},
};

use super::flock::Flock;
use super::ui::UiApp;

/// Seconds of audio in each generated sample.
const SAMPLE_SECONDS: f32 = 2.0;
/// Samples kept for the oscilloscope.
const SCOPE_CAPACITY: usize = 8192;

/// Main application builder
pub struct Swarm {
    agents: usize,
    populations: usize,
    voices: usize,
    seed: u64,
    config: EngineConfig,
}

impl Swarm {
    pub fn new() -> Self {
        Self {
            agents: 32,
            populations: 3,
            voices: 6,
            seed: 7,
            config: EngineConfig::default(),
        }
    }

    /// Number of simulated agents
    pub fn agents(mut self, agents: usize) -> Self {
        self.agents = agents;
        self
    }

    /// Number of populations, each with its own generated sample
    pub fn populations(mut self, populations: usize) -> Self {
        self.populations = populations.clamp(1, 4);
        self
    }

    /// Voice ceiling per population
    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the application (takes over the terminal, plays audio)
    pub fn run(self) -> EyreResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0 as f32;
        let output_channels = config.channels() as usize;
        info!("Output: {sample_rate} Hz, {output_channels} channel(s)");
        info!(
            "{} agents in {} population(s), {} voices each",
            self.agents, self.populations, self.voices
        );

        let (mut handle, rx, tx) = channels(256);
        let (mut scope_tx, scope_rx) = RingBuffer::<f32>::new(SCOPE_CAPACITY);

        let mut rng = SmallRng::seed_from_u64(self.seed);
        for population in 0..self.populations {
            handle.upload_sample(population, generate_sample(population, sample_rate, &mut rng)?)?;
            handle.set_voice_limit(population, self.voices)?;
        }

        let mut engine = GrainEngine::new(sample_rate, output_channels, self.config, rx, tx);

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                engine.process_block(data);
                for frame in data.chunks(output_channels) {
                    if scope_tx.push(frame[0]).is_err() {
                        break;
                    }
                }
            },
            |err| error!("Audio stream error: {err}"),
            None,
        )?;
        stream.play()?;

        let flock = Flock::new(self.agents, self.populations, self.seed);

        // The TUI owns the terminal; keep log output from tearing it.
        log::set_max_level(LevelFilter::Off);
        let mut terminal = ratatui::init();
        let result = UiApp::new(handle, flock, scope_rx, self.populations, self.voices)
            .run(&mut terminal);
        ratatui::restore();
        log::set_max_level(LevelFilter::Info);

        drop(stream);
        result
    }
}

impl Default for Swarm {
    fn default() -> Self {
        Self::new()
    }
}

/// A distinct test timbre per population.
fn generate_sample(
    population: usize,
    sample_rate: f32,
    rng: &mut SmallRng,
) -> EyreResult<SampleBuffer> {
    let frames = (SAMPLE_SECONDS * sample_rate) as usize;
    let tau = std::f32::consts::TAU;
    let samples: Vec<f32> = match population % 4 {
        // Detuned saw chord.
        0 => (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate;
                [110.0, 110.7, 165.0, 220.4]
                    .iter()
                    .map(|f| 2.0 * (t * f - (t * f + 0.5).floor()))
                    .sum::<f32>()
                    * 0.15
            })
            .collect(),
        // Struck bells, one every quarter second.
        1 => (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let local = t % 0.25;
                let decay = (-local * 12.0).exp();
                let modulator = (tau * 1_237.0 * local).sin() * 2.0 * decay;
                (tau * 880.0 * local + modulator).sin() * decay * 0.5
            })
            .collect(),
        // Low-passed noise.
        2 => {
            let mut state = 0.0;
            (0..frames)
                .map(|_| {
                    let white: f32 = rng.random_range(-1.0..1.0);
                    state += (white - state) * 0.08;
                    state * 2.0
                })
                .collect()
        }
        // Rising sine sweep.
        _ => {
            let mut phase = 0.0f32;
            (0..frames)
                .map(|i| {
                    let progress = i as f32 / frames as f32;
                    phase = (phase + 200.0 * 8.0f32.powf(progress) / sample_rate).fract();
                    (phase * tau).sin() * 0.4
                })
                .collect()
        }
    };
    Ok(SampleBuffer::from_mono(sample_rate, samples)?)
}
