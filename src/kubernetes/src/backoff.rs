//! Bounded, jittered exponential backoff for idempotent external calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, attempts: u32) -> Self {
        Self {
            base,
            max,
            attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the given retry attempt: `base * 2^attempt` capped at
    /// `max`, jittered down to at most half of the capped value.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(self.max);
        let millis = capped.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
            attempts: 5,
        }
    }
}

/// Run `op` until it succeeds or the attempt budget is spent. The last
/// error is returned as is.
pub async fn retry<T, E, F, Fut>(policy: &Backoff, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.attempts() {
                    return Err(e);
                }
                let delay = policy.delay(attempt);
                tracing::warn!(error = %e, attempt = attempt, delay_ms = delay.as_millis() as u64, "Retry after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use rstest::rstest;

    #[rstest(attempt, case(0), case(1), case(3), case(8))]
    fn delay_stays_within_jitter_window(attempt: u32) {
        let policy = Backoff::new(Duration::from_millis(100), Duration::from_secs(2), 5);
        let exp = Duration::from_millis(100)
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(Duration::from_secs(2));
        for _ in 0..32 {
            let delay = policy.delay(attempt);
            assert!(delay <= capped);
            assert!(delay >= capped / 2);
        }
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempt_budget() {
        let policy = Backoff::new(Duration::from_millis(1), Duration::from_millis(2), 3);
        let calls = AtomicU32::new(0);
        let res: Result<(), String> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("transient".to_string()) }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = Backoff::new(Duration::from_millis(1), Duration::from_millis(2), 5);
        let calls = AtomicU32::new(0);
        let res: Result<u32, String> = retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
