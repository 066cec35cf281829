// Grain-level building blocks: sample storage, the grain voice, the pool
// that holds them and the messages that drive the engine.

pub mod grain;
pub mod message;
pub mod pool;
pub mod sample;
