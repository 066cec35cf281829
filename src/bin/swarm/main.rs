//! swarm - Terminal granular swarm
//!
//! Run with: cargo run --bin swarm

mod app;
mod flock;
mod ui;

use app::Swarm;
use log::LevelFilter;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()?;

    Swarm::new().agents(48).populations(3).voices(6).run()
}
