//! Retry schedule for failed outbox events.

use chrono::TimeDelta;

/// Attempt count from which the backoff stops growing.
pub const BACKOFF_CEILING_ATTEMPTS: u32 = 4;

/// Returns how long a failed event with `attempts` failures waits before it
/// may be claimed again.
///
/// ```
/// use chrono::TimeDelta;
/// use conveyor::notification::domain::retry_backoff;
///
/// assert_eq!(retry_backoff(1), TimeDelta::seconds(5));
/// assert_eq!(retry_backoff(9), TimeDelta::seconds(300));
/// ```
#[must_use]
pub fn retry_backoff(attempts: u32) -> TimeDelta {
    let seconds = match attempts {
        0 | 1 => 5,
        2 => 15,
        3 => 60,
        _ => 300,
    };
    TimeDelta::seconds(seconds)
}
