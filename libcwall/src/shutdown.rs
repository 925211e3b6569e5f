//! Cooperative cancellation for the pipeline's waits
//!
//! The only suspension points in a run are the inter-stage delay and the
//! pauses between publish attempts. Both go through [`Shutdown::sleep`] so a
//! signal handler can cut them short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Granularity at which a sleeping task notices a shutdown request
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Cloneable shutdown flag
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Shared flag for signal handlers that need a plain `AtomicBool`
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }

    /// Sleep for `duration` unless shutdown is requested first
    ///
    /// Returns `true` if the full duration elapsed, `false` if cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
