//! Deterministic exponential backoff for failed deliveries.
//!
//! Reproducibility is part of the contract: retry schedules must be exactly
//! computable from the attempt count and the webhook's configured bounds, so
//! there is no jitter here.

use std::time::Duration;

/// Exponent clamp preventing multiplier overflow on pathological attempt
/// counts.
const MAX_EXPONENT: u32 = 20;

/// Returns the delay before the next attempt.
///
/// `attempts_so_far` is the number of attempts executed *before* the one
/// that just failed, so the first retry of a delivery waits exactly
/// `min_backoff`. The delay doubles per attempt and is capped at
/// `max_backoff`:
///
/// `delay = min(max_backoff, min_backoff * 2^attempts_so_far)`
pub fn retry_delay(attempts_so_far: u32, min_backoff: Duration, max_backoff: Duration) -> Duration {
    let exponent = attempts_so_far.min(MAX_EXPONENT);
    let multiplier = 2_u32.saturating_pow(exponent);
    let delay = min_backoff.saturating_mul(multiplier);

    std::cmp::min(delay, max_backoff)
}
