//! TUI module for swarm
//!
//! Steps the flock, streams snapshots to the engine and shows what the
//! engine reports back.

mod status;
mod voices;
mod waveform;

use std::time::{Duration, Instant};

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};
use rtrb::Consumer;

use swarm_grains::synth::{
    message::{EngineHandle, Telemetry},
    sample::MAX_POPULATIONS,
};

use super::flock::Flock;

use status::{render_status, EngineStats};
use voices::{render_voices, VoiceTable};
use waveform::render_waveform;

/// Audio visualization buffer size
const VIS_BUFFER_SIZE: usize = 1024;

pub struct UiApp {
    handle: EngineHandle,
    flock: Flock,
    scope_rx: Consumer<f32>,
    scope: Vec<f32>,
    stats: EngineStats,
    voices: VoiceTable,
    muted: [bool; MAX_POPULATIONS],
    selected: usize,
    paused: bool,
    should_quit: bool,
}

impl UiApp {
    pub fn new(
        handle: EngineHandle,
        flock: Flock,
        scope_rx: Consumer<f32>,
        populations: usize,
        voice_limit: usize,
    ) -> Self {
        Self {
            handle,
            flock,
            scope_rx,
            scope: vec![0.0; VIS_BUFFER_SIZE],
            stats: EngineStats::default(),
            voices: VoiceTable::new(populations, voice_limit),
            muted: [false; MAX_POPULATIONS],
            selected: 0,
            paused: false,
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        let mut last_step = Instant::now();
        while !self.should_quit {
            let now = Instant::now();
            let dt = now.duration_since(last_step).as_secs_f32();
            last_step = now;

            if !self.paused {
                self.flock.step(dt);
                // A full channel just skips this frame's snapshot.
                let _ = self.handle.update_agents(self.flock.snapshot(), None);
            }
            self.poll_telemetry();
            self.poll_scope();

            terminal.draw(|frame| self.render(frame))?;

            // ~60fps
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_telemetry(&mut self) {
        while let Some(telemetry) = self.handle.poll_telemetry() {
            match telemetry {
                Telemetry::Meter {
                    active_grains,
                    level,
                    dropped_grains,
                    load,
                } => {
                    self.stats = EngineStats {
                        active_grains,
                        level,
                        dropped_grains,
                        load,
                    };
                }
                Telemetry::VoiceGranted { population, agent } => {
                    self.voices.grant(population, agent);
                }
                Telemetry::VoiceRevoked { population, agent } => {
                    self.voices.revoke(population, agent);
                }
                Telemetry::Crossfade {
                    population,
                    agent,
                    direction,
                    progress,
                } => self.voices.fade(population, agent, direction, progress),
            }
        }
    }

    fn poll_scope(&mut self) {
        let mut fresh = 0;
        while let Ok(sample) = self.scope_rx.pop() {
            self.scope.push(sample);
            fresh += 1;
        }
        if fresh > 0 && self.scope.len() > VIS_BUFFER_SIZE {
            let excess = self.scope.len() - VIS_BUFFER_SIZE;
            self.scope.drain(0..excess);
        }
    }

    fn handle_key(&mut self, key: KeyCode) -> EyreResult<()> {
        let populations = self.voices.populations();
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char(' ') => {
                self.paused = !self.paused;
                self.handle.set_paused(self.paused)?;
                if self.paused {
                    self.voices.clear();
                }
            }
            KeyCode::Tab => {
                self.selected = (self.selected + 1) % populations;
            }
            KeyCode::Up | KeyCode::Down => {
                let limit = self.voices.limit(self.selected);
                let limit = if key == KeyCode::Up {
                    limit + 1
                } else {
                    limit.saturating_sub(1)
                };
                self.voices.set_limit(self.selected, limit);
                self.handle.set_voice_limit(self.selected, limit)?;
            }
            KeyCode::Char('m') => {
                self.muted[self.selected] = !self.muted[self.selected];
                let muted: Vec<usize> = (0..populations).filter(|&p| self.muted[p]).collect();
                self.handle.set_muted(&muted)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Status bar
                Constraint::Min(6),    // Voices
                Constraint::Length(8), // Waveform
                Constraint::Length(1), // Help bar
            ])
            .split(frame.area());

        render_status(frame, chunks[0], &self.stats, self.flock.len(), self.paused);
        render_voices(frame, chunks[1], &self.voices, &self.muted, self.selected);
        render_waveform(frame, chunks[2], &self.scope, self.stats.level);

        let help = Paragraph::new(
            " [Q] Quit  [Space] Pause  [Tab] Population  [↑/↓] Voices  [M] Mute",
        )
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, chunks[3]);
    }
}
