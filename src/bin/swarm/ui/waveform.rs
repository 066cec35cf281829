//! Output scope: the last few milliseconds of channel 0, with the meter's
//! decayed level drawn as a pair of guide lines.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame,
};

/// Floor for the dBFS readout.
const MIN_DB: f32 = -60.0;

fn to_db(level: f32) -> f32 {
    if level <= 0.0 {
        MIN_DB
    } else {
        (20.0 * level.log10()).max(MIN_DB)
    }
}

pub fn render_waveform(frame: &mut Frame, area: Rect, scope: &[f32], level: f32) {
    let title = format!(" Output  {:>5.1} dBFS ", to_db(level));
    let block = Block::default().title(title).borders(Borders::ALL);

    let step = 1.0 / scope.len().max(1) as f64;
    let trace: Vec<(f64, f64)> = scope
        .iter()
        .enumerate()
        .map(|(i, &sample)| (i as f64 * step, sample as f64))
        .collect();
    let level = level.clamp(0.0, 1.0) as f64;
    let upper = [(0.0, level), (1.0, level)];
    let lower = [(0.0, -level), (1.0, -level)];

    let guide = Style::default().fg(Color::Yellow);
    let datasets = vec![
        Dataset::default()
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Line)
            .style(guide)
            .data(&upper),
        Dataset::default()
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Line)
            .style(guide)
            .data(&lower),
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&trace),
    ];

    let axis = Style::default().fg(Color::DarkGray);
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(Axis::default().bounds([0.0, 1.0]).style(axis))
        .y_axis(Axis::default().bounds([-1.0, 1.0]).style(axis));

    frame.render_widget(chart, area);
}
