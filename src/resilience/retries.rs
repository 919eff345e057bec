//! Bounded retry loop for configuration pushes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::ReloadConfig;
use crate::resilience::backoff::calculate_backoff;

/// Retry budget for a single reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 100,
        }
    }
}

impl From<&ReloadConfig> for RetryPolicy {
    fn from(config: &ReloadConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

/// What happened during a retry loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Number of times the operation ran.
    pub attempts: u32,
    /// Whether the last attempt succeeded.
    pub succeeded: bool,
    /// Delays slept between attempts, in order.
    pub delays: Vec<Duration>,
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// The closure receives the 1-based attempt number. Failures are logged and
/// never propagated; there is no sleep after the final attempt.
pub async fn retry_with_backoff<F, Fut, E>(policy: &RetryPolicy, mut op: F) -> RetryReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut report = RetryReport::default();

    for attempt in 1..=policy.max_attempts {
        report.attempts = attempt;
        match op(attempt).await {
            Ok(()) => {
                report.succeeded = true;
                return report;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = calculate_backoff(attempt, policy.initial_delay, policy.max_delay);
                tracing::error!(
                    attempt,
                    error = %e,
                    retry_delay_seconds = delay.as_secs_f64(),
                    "config push failed"
                );
                report.delays.push(delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    attempt,
                    error = %e,
                    "config push failed, retry budget exhausted"
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_until_success() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let report = retry_with_backoff(&RetryPolicy::default(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 5 {
                    Err("admin endpoint unavailable")
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(report.succeeded);
        assert_eq!(report.attempts, 6);
        let secs: Vec<u64> = report.delays.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
        assert_eq!(started.elapsed(), Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_never_sleeps() {
        let started = Instant::now();
        let report = retry_with_backoff(&RetryPolicy::default(), |_| async {
            Ok::<(), &str>(())
        })
        .await;

        assert_eq!(report.attempts, 1);
        assert!(report.delays.is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausts_silently() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        };
        let report = retry_with_backoff(&policy, |_| async { Err::<(), _>("down") }).await;

        assert!(!report.succeeded);
        assert_eq!(report.attempts, 10);
        assert_eq!(report.delays.len(), 9);
        assert_eq!(report.delays.last(), Some(&Duration::from_secs(60)));
    }
}
