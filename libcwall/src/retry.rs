//! Capped retry policy for remote calls

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{CwallError, Result};
use crate::shutdown::Shutdown;

/// Fixed-delay retry: up to `max_attempts` tries with `delay` between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// Waits only between attempts, so `n` failed attempts cost `n - 1`
    /// delays. A shutdown request during a wait ends the loop with
    /// `CwallError::Cancelled`.
    pub async fn run<T, F, Fut>(&self, label: &str, shutdown: &Shutdown, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "{} failed on attempt {}/{}: {}. Retrying in {}s...",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        self.delay.as_secs()
                    );
                    if !shutdown.sleep(self.delay).await {
                        return Err(CwallError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            "{} failed after {} attempts: {}",
                            label, self.max_attempts, e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
