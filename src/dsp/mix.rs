//! Signal mixing, equal-power crossfading and panning.

use std::f32::consts::FRAC_PI_2;

/*
Signal Mixing
=============

Grains are summed into one stereo buffer. Three gain laws keep that sum
well-behaved: equal-power fades for voice handoffs, equal-power panning for
placement, and 1/√N normalization for polyphony.

Vocabulary
----------

  mixing        Combining signals by addition.

  crossfade     Transitioning from one source to another using complementary
                weights. Here the "sources" are agents gaining and losing
                their voice.

  equal-power   Weights chosen so that the squared weights sum to 1. For
                uncorrelated signals power adds, so this keeps the perceived
                loudness constant.

  polyphony     Number of grains sounding at once.


Linear vs Equal-Power Crossfade
-------------------------------

LINEAR:

    weight_out = 1.0 - p
    weight_in  = p

    At p = 0.5 both signals sit at 50% amplitude. Uncorrelated signals at
    50% each carry only half the power of one at 100%: an audible dip.

EQUAL-POWER (what we implement):

    weight_out = sqrt(1.0 - p)
    weight_in  = sqrt(p)

    weight_out² + weight_in² = 1 for every p, so the energy handed over
    by the fading-out agent is exactly the energy gained by the fading-in one.

      Level
        1.0 ──────╲         ╱──────
                    ╲     ╱
        0.707        ╳       ← both at √0.5, power still sums to 1
                    ╱     ╲
        0.0 ──────╱         ╲──────
            0.0      0.5      1.0
                 progress


Equal-Power Panning
-------------------

Position x in [0, 1] maps to an angle θ = x × π/2:

    left  = cos θ
    right = sin θ

left² + right² = 1, so a grain is equally loud anywhere across the field.


Polyphony Normalization
-----------------------

N uncorrelated grains of equal level sum to a signal √N times louder (in
amplitude) than one grain. Dividing by √N keeps the mix level stable as
grains come and go:

    N = 1  →  × 1.0  (no change)
    N = 4  →  × 0.5
    N = 16 →  × 0.25

Dividing by N instead would crush dense clouds; not dividing at all would
clip them.
*/

/// Gain of an agent fading in at `progress` (0..1).
#[inline]
pub fn fade_in_gain(progress: f32) -> f32 {
    progress.clamp(0.0, 1.0).sqrt()
}

/// Gain of an agent fading out at `progress` (0..1).
#[inline]
pub fn fade_out_gain(progress: f32) -> f32 {
    (1.0 - progress.clamp(0.0, 1.0)).sqrt()
}

/// Equal-power `(left, right)` gains for normalized horizontal position `x`.
#[inline]
pub fn equal_power_pan(x: f32) -> (f32, f32) {
    let theta = x.clamp(0.0, 1.0) * FRAC_PI_2;
    (theta.cos(), theta.sin())
}

/// Mix gain applied to the sum of `active` grains.
#[inline]
pub fn polyphony_gain(active: usize) -> f32 {
    if active > 1 {
        1.0 / (active as f32).sqrt()
    } else {
        1.0
    }
}

/// Add signal B into signal A in-place (summing).
///
/// ⚠️ WARNING: Can exceed [-1.0, +1.0] range!
#[inline]
pub fn sum_in_place(a: &mut [f32], b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());

    for (sa, &sb) in a.iter_mut().zip(b.iter()) {
        *sa += sb;
    }
}

/// Multiply every sample by `gain`.
#[inline]
pub fn scale_in_place(buffer: &mut [f32], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossfade_is_equal_power() {
        for step in 0..=100 {
            let p = step as f32 / 100.0;
            let energy = fade_in_gain(p).powi(2) + fade_out_gain(p).powi(2);
            assert!((energy - 1.0).abs() < 1e-6, "p={p} energy={energy}");
        }
    }

    #[test]
    fn fades_hit_their_end_points() {
        assert_eq!(fade_in_gain(0.0), 0.0);
        assert_eq!(fade_in_gain(1.0), 1.0);
        assert_eq!(fade_out_gain(0.0), 1.0);
        assert_eq!(fade_out_gain(1.0), 0.0);
        // Out-of-range progress clamps.
        assert_eq!(fade_in_gain(2.0), 1.0);
        assert_eq!(fade_out_gain(-1.0), 1.0);
    }

    #[test]
    fn pan_is_equal_power() {
        for step in 0..=10 {
            let (l, r) = equal_power_pan(step as f32 / 10.0);
            assert!((l * l + r * r - 1.0).abs() < 1e-6);
        }
        let (l, r) = equal_power_pan(0.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = equal_power_pan(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn polyphony_normalization() {
        assert_eq!(polyphony_gain(0), 1.0);
        assert_eq!(polyphony_gain(1), 1.0);
        assert_eq!(polyphony_gain(4), 0.5);
        assert!((polyphony_gain(16) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn sum_can_exceed_one() {
        let mut a = [1.0, 0.5];
        let b = [1.0, 0.25];

        sum_in_place(&mut a, &b);

        assert_eq!(a[0], 2.0);
        assert_eq!(a[1], 0.75);
    }

    #[test]
    fn scale_applies_gain() {
        let mut buffer = [1.0, -0.5, 0.25];
        scale_in_place(&mut buffer, 0.5);
        assert_eq!(buffer, [0.5, -0.25, 0.125]);
    }
}
