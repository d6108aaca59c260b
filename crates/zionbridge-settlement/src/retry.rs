//! Backoff schedule for retryable external calls.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based): exponential in the
/// attempt, capped, with half-to-full jitter so concurrent settlements
/// retrying against the same backend do not thundering-herd it.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let raw = base.saturating_mul(factor).min(cap);
    let millis = u64::try_from(raw.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_millis(5_000);

    #[test]
    fn grows_exponentially_until_the_cap() {
        for _ in 0..50 {
            assert!(backoff_delay(1, BASE, CAP) <= BASE);
            assert!(backoff_delay(2, BASE, CAP) <= BASE * 2);
            assert!(backoff_delay(3, BASE, CAP) <= BASE * 4);
            assert!(backoff_delay(30, BASE, CAP) <= CAP);
        }
    }

    #[test]
    fn jitter_never_drops_below_half() {
        for attempt in 1..8 {
            let raw = BASE * 2u32.pow(attempt - 1);
            let floor = raw.min(CAP) / 2;
            for _ in 0..50 {
                assert!(backoff_delay(attempt, BASE, CAP) >= floor);
            }
        }
    }

    #[test]
    fn zero_base_is_zero_delay() {
        assert_eq!(backoff_delay(5, Duration::ZERO, CAP), Duration::ZERO);
    }
}
