//! Exponential backoff.

use std::time::Duration;

/// Delay to wait after the `attempt`-th failure (1-based).
///
/// `base * 2^(attempt-1)`, capped at `max`. Attempt 0 never waits.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        let delays: Vec<u64> = (1..=8)
            .map(|a| calculate_backoff(a, base, max).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);

        assert_eq!(calculate_backoff(0, base, max), Duration::ZERO);
        assert_eq!(calculate_backoff(100, base, max), max);
    }
}
