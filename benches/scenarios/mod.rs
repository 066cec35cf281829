//! Real-world scenario benchmarks.
//!
//! These drive the whole engine the way a host does: a snapshot before
//! every block, audio out after it.

mod allocation;
mod engine;

pub use allocation::bench_allocation;
pub use engine::bench_engine;
