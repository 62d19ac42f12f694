//! Jittered exponential backoff

use std::time::Duration;

/// Upper bound of the delay after the 1-based `attempt`: `base * (2^attempt - 1)`.
///
/// Computed in nanoseconds; saturates at [`Duration::MAX`] only when the
/// product does not fit in a `Duration`.
pub fn backoff_ceiling(base: Duration, attempt: u32) -> Duration {
    let factor = match 1u128.checked_shl(attempt) {
        Some(pow) if attempt < 128 => pow - 1,
        _ => u128::MAX,
    };

    base.as_nanos()
        .checked_mul(factor)
        .and_then(duration_from_nanos)
        .unwrap_or(Duration::MAX)
}

fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Delay after the 1-based `attempt` for a uniform `sample` in `[0, 1]`.
///
/// Samples outside that range are clamped, NaN counts as zero. The result
/// never exceeds [`backoff_ceiling`].
pub fn backoff_delay(base: Duration, attempt: u32, sample: f64) -> Duration {
    let sample = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(0.0, 1.0)
    };

    let ceiling = backoff_ceiling(base, attempt);
    if sample >= 1.0 {
        return ceiling;
    }

    let nanos = ceiling.as_nanos() as f64 * sample;
    let delay = if nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos as u64)
    } else {
        Duration::try_from_secs_f64(ceiling.as_secs_f64() * sample).unwrap_or(ceiling)
    };
    delay.min(ceiling)
}
