//! Voice table widget - who holds a voice in each population, and who is
//! fading in or out

use std::collections::{BTreeSet, HashMap};

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use swarm_grains::{engine::allocator::FadeDirection, synth::sample::MAX_POPULATIONS};

/// Host-side mirror of the engine's allocation, rebuilt from telemetry.
pub struct VoiceTable {
    voiced: Vec<BTreeSet<u32>>,
    limits: Vec<usize>,
    /// Running fades by agent: population, direction, progress.
    fades: HashMap<u32, (usize, FadeDirection, f32)>,
}

impl VoiceTable {
    pub fn new(populations: usize, limit: usize) -> Self {
        let populations = populations.clamp(1, MAX_POPULATIONS);
        Self {
            voiced: vec![BTreeSet::new(); populations],
            limits: vec![limit; populations],
            fades: HashMap::new(),
        }
    }

    pub fn populations(&self) -> usize {
        self.voiced.len()
    }

    pub fn limit(&self, population: usize) -> usize {
        self.limits.get(population).copied().unwrap_or(0)
    }

    pub fn set_limit(&mut self, population: usize, limit: usize) {
        if let Some(slot) = self.limits.get_mut(population) {
            *slot = limit;
        }
    }

    pub fn grant(&mut self, population: usize, agent: u32) {
        if let Some(set) = self.voiced.get_mut(population) {
            set.insert(agent);
        }
    }

    pub fn revoke(&mut self, population: usize, agent: u32) {
        if let Some(set) = self.voiced.get_mut(population) {
            set.remove(&agent);
        }
    }

    pub fn fade(&mut self, population: usize, agent: u32, direction: FadeDirection, progress: f32) {
        if progress >= 1.0 {
            self.fades.remove(&agent);
        } else {
            self.fades.insert(agent, (population, direction, progress));
        }
    }

    pub fn clear(&mut self) {
        self.voiced.iter_mut().for_each(BTreeSet::clear);
        self.fades.clear();
    }
}

pub fn render_voices(
    frame: &mut Frame,
    area: Rect,
    table: &VoiceTable,
    muted: &[bool; MAX_POPULATIONS],
    selected: usize,
) {
    let block = Block::default().title(" Voices ").borders(Borders::ALL);

    let lines: Vec<Line> = table
        .voiced
        .iter()
        .enumerate()
        .map(|(population, voiced)| {
            let mut label_style = Style::default().fg(Color::Cyan);
            if population == selected {
                label_style = label_style.add_modifier(Modifier::REVERSED);
            }
            let mut spans = vec![
                Span::styled(format!(" Pop {population} "), label_style),
                Span::styled(
                    format!(" {}/{} ", voiced.len(), table.limit(population)),
                    Style::default().fg(Color::White),
                ),
            ];
            if muted[population] {
                spans.push(Span::styled("muted ", Style::default().fg(Color::Red)));
            }
            for agent in voiced {
                let style = match table.fades.get(agent) {
                    Some((_, FadeDirection::In, _)) => Style::default().fg(Color::Green),
                    _ => Style::default().fg(Color::Gray),
                };
                spans.push(Span::styled(format!("{agent} "), style));
            }
            let fading_out = table
                .fades
                .iter()
                .filter(|(agent, (fade_population, direction, _))| {
                    *fade_population == population
                        && *direction == FadeDirection::Out
                        && !voiced.contains(*agent)
                })
                .count();
            if fading_out > 0 {
                spans.push(Span::styled(
                    format!("(+{fading_out} fading)"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
