//! Fractional sample reads.
//!
//! Grains read their source at non-integer positions (pitch shifting moves
//! the read head by `2^(semitones/12)` samples per output sample). A 4-point
//! Catmull-Rom spline through the neighbouring samples keeps those reads
//! smooth without the dull top end of linear interpolation.
//!
//! Reads wrap inside a region `[start, end)` of the buffer, so a grain that
//! runs off the end of the selected range continues from its beginning.

/// Catmull-Rom interpolation between `y1` and `y2` at `fraction` (0..1).
#[inline]
pub fn catmull_rom(y0: f32, y1: f32, y2: f32, y3: f32, fraction: f32) -> f32 {
    let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c = -0.5 * y0 + 0.5 * y2;
    let d = y1;

    ((a * fraction + b) * fraction + c) * fraction + d
}

/// Fold `position` into `[start, end)`.
#[inline]
pub fn wrap_position(position: f64, start: usize, end: usize) -> f64 {
    let len = end.saturating_sub(start);
    if len == 0 {
        return start as f64;
    }
    start as f64 + (position - start as f64).rem_euclid(len as f64)
}

/// Read `samples` at fractional `position`, wrapping inside `[start, end)`.
///
/// Returns silence for an empty region.
#[inline]
pub fn cubic_wrapped(samples: &[f32], start: usize, end: usize, position: f64) -> f32 {
    let end = end.min(samples.len());
    let len = end.saturating_sub(start);
    if len == 0 {
        return 0.0;
    }

    let relative = (position - start as f64).rem_euclid(len as f64);
    let index = relative.floor() as usize;
    let fraction = (relative - index as f64) as f32;

    let at = |offset: isize| -> f32 {
        let wrapped = (index as isize + offset).rem_euclid(len as isize) as usize;
        samples[start + wrapped]
    };

    catmull_rom(at(-1), at(0), at(1), at(2), fraction)
}
