use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-wait retry: `max_attempts` tries, `wait` between each, and a
/// predicate deciding which errors deserve another try.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    wait: Duration,
    retryable: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("wait", &self.wait)
            .finish()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    /// `max_attempts` is clamped to at least one.
    pub fn fixed(max_attempts: u32, wait: Duration, retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
            retryable,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `op` until it succeeds, hits a non-retryable error, or the
    /// attempts run out. The last error is returned unchanged. `op` receives
    /// the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Succeeded on attempt {}/{}", attempt, self.max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }

                    if !(self.retryable)(&e) {
                        warn!("Non-retryable error: {}", e);
                        return Err(e);
                    }

                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, self.max_attempts, e, self.wait
                    );
                    tokio::time::sleep(self.wait).await;
                }
            }
        }
    }
}
