//! cwall - screenshot wall publisher
//!
//! This library moves screenshots from a watched folder to a cloud object
//! store and then onto a social feed, keeping each item's state in its
//! filename and directory and enforcing the publisher's daily quota.

pub mod config;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod naming;
pub mod pipeline;
pub mod platforms;
pub mod quota;
pub mod retry;
pub mod shutdown;
pub mod state_log;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{CwallError, Result};
pub use pipeline::{scan_items, CycleSummary, Pipeline, PublishSummary, UploadSummary};
pub use retry::RetryPolicy;
pub use shutdown::Shutdown;
pub use state_log::{StateLog, StateRecord};
pub use types::{ItemState, QuotaWindow, ScreenshotItem};
