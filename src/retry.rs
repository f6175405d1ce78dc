//! Bounded polling.
//!
//! Waiting on the provider is always bounded by a fixed number of checks a
//! fixed interval apart, so that callers reach a terminal state.

use std::{future::Future, time::Duration};

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Poll {
    pub interval: Duration,
    pub attempts: u32,
}

impl Poll {
    #[must_use]
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Single wait followed by a single check.
    #[must_use]
    pub const fn once(interval: Duration) -> Self {
        Self::new(interval, 1)
    }

    /// Repeatedly sleeps for the interval and runs `check`, until `check`
    /// returns `true` or the attempts are exhausted.
    ///
    /// Callers are expected to check once before polling: the first check
    /// only happens after the first interval. Errors from `check` end the
    /// poll.
    pub async fn until<F, Fut>(&self, mut check: F) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;
            if check().await? {
                return Ok(true);
            }
            trace!("poll attempt {attempt}/{} unsuccessful", self.attempts);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::error::Error;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempts() {
        let checks = &AtomicU32::new(0);
        let start = Instant::now();

        let done = Poll::new(Duration::from_secs(1), 3)
            .until(|| async move {
                checks.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            })
            .await
            .unwrap();

        assert!(!done);
        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let checks = &AtomicU32::new(0);

        let done = Poll::new(Duration::from_millis(100), 10)
            .until(|| async move { Ok(checks.fetch_add(1, Ordering::SeqCst) == 1) })
            .await
            .unwrap();

        assert!(done);
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_end_the_poll() {
        let checks = &AtomicU32::new(0);

        let result = Poll::once(Duration::from_secs(1))
            .until(|| async move {
                checks.fetch_add(1, Ordering::SeqCst);
                Err::<bool, _>(Error::internal("registry unavailable"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }
}
