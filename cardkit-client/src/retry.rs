use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use cardkit_core::config::DispatcherSettings;
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff: the first retry waits `initial_delay`, each later
/// retry doubles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub fn from_settings(settings: &DispatcherSettings) -> Self {
        Self::new(settings.max_retries, settings.initial_delay())
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retries are spent. The last error is returned.
///
/// `operation` receives the one-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &BackoffPolicy,
    label: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.total_attempts() && is_retryable(&e) => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = policy.total_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "{label} failed, retrying: {e}"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug)]
    struct Failure(bool);

    impl Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "failure (retryable: {})", self.0)
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = BackoffPolicy::new(4, Duration::from_millis(1500));
        let delays: Vec<u64> = (0..4).map(|r| policy.delay_for(r).as_millis() as u64).collect();
        assert_eq!(delays, vec![1500, 3000, 6000, 12000]);
        assert_eq!(policy.delay_for(40), Duration::from_millis(1500).saturating_mul(u32::MAX));
    }

    #[tokio::test]
    async fn test_exhaustion_makes_max_retries_plus_one_attempts() {
        let policy = BackoffPolicy::new(4, Duration::from_millis(2));
        let stamps = Mutex::new(Vec::new());

        let result: Result<(), Failure> = retry_with_backoff(
            &policy,
            "render",
            |e: &Failure| e.0,
            |_| {
                stamps.lock().unwrap().push(Instant::now());
                async { Err(Failure(true)) }
            },
        )
        .await;

        assert!(result.is_err());
        let stamps = stamps.into_inner().unwrap();
        assert_eq!(stamps.len(), 5);
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        for (retry, gap) in gaps.iter().enumerate() {
            assert!(*gap >= policy.delay_for(retry as u32), "gap {retry} too short");
        }
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let policy = BackoffPolicy::new(4, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), Failure> =
            retry_with_backoff(&policy, "render", |e: &Failure| e.0, |_| {
                calls += 1;
                async { Err(Failure(false)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let policy = BackoffPolicy::new(4, Duration::from_millis(1));
        let result = retry_with_backoff(&policy, "render", |e: &Failure| e.0, |attempt| async move {
            if attempt < 3 { Err(Failure(true)) } else { Ok(attempt) }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }
}
