//! Status bar widget - level meter, grain count and audio thread load

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Latest meter telemetry from the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub active_grains: usize,
    pub level: f32,
    pub dropped_grains: u64,
    pub load: f32,
}

/// Width of the text level bar in cells.
const METER_WIDTH: usize = 20;

fn meter_bar(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round()) as usize;
    format!("{}{}", "█".repeat(filled), "·".repeat(METER_WIDTH - filled))
}

pub fn render_status(
    frame: &mut Frame,
    area: Rect,
    stats: &EngineStats,
    agents: usize,
    paused: bool,
) {
    let block = Block::default().title(" swarm ").borders(Borders::ALL);

    let (state, color) = if paused {
        ("⏸ Paused", Color::Yellow)
    } else {
        ("▶ Running", Color::Green)
    };
    let load_color = if stats.load > 0.8 {
        Color::Red
    } else {
        Color::DarkGray
    };

    let line = Line::from(vec![
        Span::styled(format!(" {state}  "), Style::default().fg(color)),
        Span::styled(
            format!("{} ", meter_bar(stats.level)),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format!("{:.2}  ", stats.level),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("Agents: {agents}  Grains: {}  ", stats.active_grains),
            Style::default().fg(Color::Magenta),
        ),
        Span::styled(
            format!("Dropped: {}  ", stats.dropped_grains),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("Load: {:.0}%", stats.load * 100.0),
            Style::default().fg(load_color),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
