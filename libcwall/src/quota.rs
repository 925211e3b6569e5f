//! Daily publishing quota
//!
//! The allowance is shared with posts made by hand or by other tools, so the
//! used count always comes from the remote service. Nothing is cached between
//! calls.

use chrono::Local;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::platforms::SocialPublisher;
use crate::types::QuotaWindow;

/// Posts per rolling day allowed by the publishing service
pub const DAILY_CAP: u32 = 50;

pub struct QuotaTracker {
    publisher: Arc<dyn SocialPublisher>,
    cap: u32,
}

impl QuotaTracker {
    pub fn new(publisher: Arc<dyn SocialPublisher>, cap: u32) -> Self {
        Self { publisher, cap }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Posts already consumed today
    ///
    /// # Errors
    ///
    /// `CwallError::Quota` when the remote record is unavailable. Callers
    /// must not retry within the same run.
    pub async fn used_quota(&self) -> Result<u32> {
        let used = self.publisher.used_quota().await?;
        debug!("{} reports {} of {} posts used", self.publisher.name(), used, self.cap);
        Ok(used)
    }

    /// Today's window, freshly queried
    pub async fn window(&self) -> Result<QuotaWindow> {
        let used = self.used_quota().await?;
        Ok(QuotaWindow {
            date: Local::now().date_naive(),
            used,
            cap: self.cap,
        })
    }
}
