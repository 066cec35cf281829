use std::{error, fmt};

/// Errors reported on the host side of the engine.
///
/// Nothing in the render path returns these: the engine skips what it
/// cannot process and reports counters through telemetry instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Sample upload rejected (empty, mismatched channel lengths, bad rate).
    InvalidSample(String),
    /// Agent snapshot entry rejected (non-finite or out-of-range field).
    InvalidAgent { id: u32, reason: &'static str },
    /// Population id outside the fixed slot table.
    PopulationOutOfRange(usize),
    /// The control channel to the engine is full.
    ChannelFull,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSample(reason) => write!(f, "Invalid sample: {reason}"),
            Self::InvalidAgent { id, reason } => write!(f, "Invalid agent {id}: {reason}"),
            Self::PopulationOutOfRange(population) => {
                write!(f, "Population {population} is out of range")
            }
            Self::ChannelFull => write!(f, "Engine control channel is full"),
        }
    }
}
