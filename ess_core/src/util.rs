//! Small numeric and time helpers shared by the detectors and the loop.

use std::time::{Duration, Instant};

/// Longest single sleep the runner takes before re-checking for shutdown.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Clamp a time delta to a usable value: negative or non-finite become 0.
#[inline]
pub fn sanitize_dt(dt_seconds: f64) -> f64 {
    if dt_seconds.is_finite() && dt_seconds > 0.0 {
        dt_seconds
    } else {
        0.0
    }
}

/// Convert configured seconds to a `Duration`, saturating negatives and NaN at zero.
#[inline]
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Seconds between two instants, 0 when `earlier` is not actually earlier.
#[inline]
pub fn secs_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}
