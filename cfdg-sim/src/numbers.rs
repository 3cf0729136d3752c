//! Numeric conversion helpers centralizing the lossy casts used by the sampler and manifest.

use num_traits::cast::cast;

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

/// Convert a count to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Fraction of `count` over `total`, returning 0.0 for an empty total.
#[must_use]
pub fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    usize_to_f64(count) / usize_to_f64(total)
}

/// Convert a step count into seconds; without a usable `dt` the count is read as seconds.
#[must_use]
pub fn steps_to_seconds(steps: i64, dt: Option<f64>) -> f64 {
    let steps = i64_to_f64(steps);
    match dt {
        Some(dt) if dt > 0.0 => steps * dt,
        _ => steps,
    }
}
