//! Benchmarks for low-level DSP primitives.

mod envelope;
mod filter;
mod interpolate;
mod limiter;
mod mix;

pub use envelope::bench_envelope;
pub use filter::bench_filter;
pub use interpolate::bench_interpolate;
pub use limiter::bench_limiter;
pub use mix::bench_mix;
