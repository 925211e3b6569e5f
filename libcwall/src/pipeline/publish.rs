//! Publish stage: uploaded items -> posts, archived by date

use chrono::Local;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{CwallError, Result};
use crate::naming;
use crate::platforms::{ObjectStore, SocialPublisher};
use crate::quota::QuotaTracker;
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;
use crate::state_log::{StateLog, StateRecord};
use crate::types::ItemState;

use super::{file_name, list_files, relative_to};

/// Tallies of one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Items posted this pass, archived or not
    pub published: usize,
    /// Posted items that could not be moved into the archive; they still
    /// sit in the watch directory under their encoded name
    pub unarchived: usize,
    /// Posts still allowed today after this pass
    pub remaining: u32,
    /// Items whose every attempt failed; they stay in place for the next run
    pub failed: usize,
    /// `.JPEG` files in the watch directory that do not decode
    pub malformed: usize,
    /// Candidates not attempted because the quota ran out
    pub pending: usize,
}

pub struct PublishStage {
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn SocialPublisher>,
    quota: QuotaTracker,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl PublishStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn SocialPublisher>,
        daily_cap: u32,
    ) -> Self {
        let quota = QuotaTracker::new(Arc::clone(&publisher), daily_cap);
        Self {
            store,
            publisher,
            quota,
            retry: RetryPolicy::default(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run one pass over `watch_dir`
    ///
    /// # Errors
    ///
    /// `CwallError::Quota` when the used count cannot be read (nothing is
    /// published), `CwallError::Auth` when the publisher rejects the token,
    /// `CwallError::Cancelled` on shutdown.
    pub async fn run(&self, watch_dir: &Path) -> Result<PublishSummary> {
        let archive_dir = naming::archive_dir_for(watch_dir, Local::now().date_naive());
        if !archive_dir.exists() {
            std::fs::create_dir_all(&archive_dir)?;
            info!("Created directory {}", archive_dir.display());
        }

        let used = self.quota.used_quota().await?;
        let cap = self.quota.cap();
        let allowance = cap.saturating_sub(used) as usize;

        let mut summary = PublishSummary::default();
        let mut candidates = Vec::new();
        for path in list_files(watch_dir)? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            match naming::decode(name) {
                Ok(remote_id) => candidates.push((name.to_string(), remote_id)),
                Err(e) if is_stray_normalized(name) => {
                    warn!("Skipping {}", e);
                    summary.malformed += 1;
                }
                Err(_) => {}
            }
        }

        if allowance == 0 {
            warn!(
                "Daily quota exhausted ({} of {} used); {} items wait for tomorrow",
                used,
                cap,
                candidates.len()
            );
            summary.pending = candidates.len();
            return Ok(summary);
        }

        let log = StateLog::for_watch_dir(watch_dir);
        let items_by_remote_id = log.items_by_remote_id().unwrap_or_else(|e| {
            warn!("Ignoring unreadable {}: {}", log.path().display(), e);
            HashMap::new()
        });
        let total = candidates.len();
        for (index, (name, remote_id)) in candidates.into_iter().enumerate() {
            if summary.published >= allowance {
                summary.pending = total - index;
                info!("Quota reached; {} items left for the next run", summary.pending);
                break;
            }
            if self.shutdown.is_requested() {
                return Err(CwallError::Cancelled);
            }

            let key = items_by_remote_id
                .get(&remote_id)
                .cloned()
                .or_else(|| naming::item_key(&name))
                .unwrap_or_else(|| name.clone());
            match self.publish_item(&name, &remote_id).await {
                Ok(media_id) => {
                    info!("{} posted with id {}", name, media_id);
                    summary.published += 1;

                    let archived = archive_dir.join(&name);
                    let file = match archive(&watch_dir.join(&name), &archived) {
                        Ok(()) => relative_to(watch_dir, &archived),
                        Err(e) => {
                            error!(
                                "{} was posted but could not be archived, move it to {} by hand: {}",
                                name,
                                archive_dir.display(),
                                e
                            );
                            summary.unarchived += 1;
                            name.clone()
                        }
                    };
                    log.record(
                        StateRecord::new(&key, ItemState::Published, file).with_remote_id(&remote_id),
                    );
                }
                Err(e @ (CwallError::Auth(_) | CwallError::Cancelled)) => return Err(e),
                Err(e) => {
                    error!(
                        "{} Failed to post after {} attempts: {}",
                        name, self.retry.max_attempts, e
                    );
                    log.record(
                        StateRecord::new(&key, ItemState::Failed, name.as_str())
                            .with_remote_id(&remote_id),
                    );
                    summary.failed += 1;
                }
            }
        }

        summary.remaining = (allowance - summary.published) as u32;
        info!(
            "Published {} posts. {} failed, {} pending, {} not archived, {} of today's quota left",
            summary.published, summary.failed, summary.pending, summary.unarchived, summary.remaining
        );
        Ok(summary)
    }

    /// Create and publish a container for one stored object, with retries
    async fn publish_item(&self, name: &str, remote_id: &str) -> Result<String> {
        let image_url = self.store.public_url(remote_id);
        let label = format!("Posting {}", name);
        self.retry
            .run(&label, &self.shutdown, |_attempt| {
                let publisher = Arc::clone(&self.publisher);
                let image_url = image_url.clone();
                async move {
                    let creation_id = publisher.create_media(&image_url).await?;
                    publisher.publish_media(&creation_id).await
                }
            })
            .await
    }
}

/// Move a posted file into the archive without replacing anything there
fn archive(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        )
        .into());
    }
    std::fs::rename(from, to)?;
    Ok(())
}

/// A `.JPEG` in the watch directory that does not decode and is not a
/// leftover normalized copy (`IMG001.JPEG`)
fn is_stray_normalized(name: &str) -> bool {
    name.ends_with(&format!(".{}", naming::NORMALIZED_EXTENSION))
        && (name.contains(naming::DELIMITER) || !name.starts_with(naming::RAW_PREFIX))
}
