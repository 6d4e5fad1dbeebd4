use crate::{
    batch::Cancellation,
    error::{Error, Result},
};
use ring::rand::{SecureRandom, SystemRandom};
use std::{future::Future, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on invocations, including the first one
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the random delay added to each backoff
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(32),
            jitter: Duration::from_millis(500),
        }
    }
}

/// Exponential backoff around a caller supplied operation. Holds no state
/// between runs so one instance is shared by every worker.
#[derive(Clone, Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    rng: SystemRandom,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            rng: SystemRandom::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The backoff before retry number `attempt` (0 based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.policy
            .base
            .saturating_mul(factor)
            .min(self.policy.cap)
    }

    fn jitter(&self) -> Duration {
        let max = self.policy.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }

        let mut bytes = [0u8; 8];
        if self.rng.fill(&mut bytes).is_err() {
            return Duration::ZERO;
        }

        Duration::from_millis(u64::from_le_bytes(bytes) % (max + 1))
    }

    /// Runs `op` until it succeeds, fails with a terminal error, or has been
    /// invoked `max_attempts` times, in which case the last error is returned.
    ///
    /// Once `cancel` fires no further attempt is made, the error of the
    /// attempt in flight is returned as is and a pending backoff is cut short.
    pub async fn run<T, F, Fut>(&self, cancel: &Cancellation, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            let err: Error = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            attempt += 1;
            if !err.is_retryable()
                || attempt >= self.policy.max_attempts
                || cancel.is_cancelled()
            {
                return Err(err);
            }

            let delay = self.backoff(attempt - 1) + self.jitter();
            tracing::debug!(attempt, ?delay, error = %err, "retrying");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "cancelled during backoff");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn unavailable() -> Error {
        Error::Remote {
            status: 503,
            reason: None,
            message: "backend unavailable".to_owned(),
        }
    }

    fn retrier(max_attempts: u32, base_ms: u64) -> Retrier {
        Retrier::new(RetryPolicy {
            max_attempts,
            base: Duration::from_millis(base_ms),
            cap: Duration::from_secs(1),
            jitter: Duration::ZERO,
        })
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let r = Retrier::new(RetryPolicy {
            max_attempts: 10,
            base: Duration::from_millis(100),
            cap: Duration::from_millis(500),
            jitter: Duration::ZERO,
        });

        assert_eq!(r.backoff(0), Duration::from_millis(100));
        assert_eq!(r.backoff(1), Duration::from_millis(200));
        assert_eq!(r.backoff(2), Duration::from_millis(400));
        assert_eq!(r.backoff(3), Duration::from_millis(500));
        assert_eq!(r.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let r = Retrier::new(RetryPolicy {
            jitter: Duration::from_millis(20),
            ..RetryPolicy::default()
        });

        for _ in 0..100 {
            assert!(r.jitter() <= Duration::from_millis(20));
        }
    }

    #[tokio::test]
    async fn recovers_after_two_unavailable() {
        let calls = &AtomicU32::new(0);
        let r = retrier(5, 20);

        let start = Instant::now();
        let value = r
            .run(&Cancellation::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // base + base * 2
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn terminal_errors_return_immediately() {
        let calls = &AtomicU32::new(0);
        let r = retrier(5, 1);

        let err = r
            .run(&Cancellation::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Remote {
                    status: 404,
                    reason: None,
                    message: "not found".to_owned(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        for max in [1, 2, 4] {
            let calls = &AtomicU32::new(0);
            let r = retrier(max, 1);

            let err = r
                .run(&Cancellation::new(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(unavailable())
                })
                .await
                .unwrap_err();

            assert!(err.is_retryable());
            assert_eq!(calls.load(Ordering::SeqCst), max);
        }
    }

    #[tokio::test]
    async fn cancelled_attempts_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let cancel = &Cancellation::new();
        let r = retrier(5, 200);

        let start = Instant::now();
        let err = r
            .run(cancel, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn cancel_cuts_the_backoff_short() {
        let calls = &AtomicU32::new(0);
        let cancel = Cancellation::new();
        let r = retrier(5, 5_000);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = r
            .run(&cancel, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = &AtomicU32::new(0);
        let r = retrier(0, 1);

        let _ = r
            .run(&Cancellation::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
