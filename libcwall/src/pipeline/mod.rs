//! Pipeline stages and the driver that runs them back to back
//!
//! One pass, strictly sequential: upload everything raw, wait for the store
//! to serve the new objects, then publish as much as today's quota allows.
//! The only suspension points are the inter-stage delay and the retry
//! backoff, both cancellable through [`Shutdown`].

pub mod publish;
pub mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{CwallError, Result};
use crate::naming;
use crate::platforms::drive::{DriveStore, TokenFileProvider};
use crate::platforms::instagram::GraphClient;
use crate::platforms::{CredentialProvider, ObjectStore, SocialPublisher};
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;
use crate::types::ScreenshotItem;

pub use publish::{PublishStage, PublishSummary};
pub use upload::{UploadStage, UploadSummary};

/// Result of a full cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub upload: UploadSummary,
    /// `None` when the publish stage was skipped because the quota could
    /// not be read
    pub publish: Option<PublishSummary>,
}

pub struct Pipeline {
    watch_dir: PathBuf,
    upload: UploadStage,
    publish: PublishStage,
    shutdown: Shutdown,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators
    pub fn new(
        config: &Config,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn SocialPublisher>,
        shutdown: Shutdown,
    ) -> Self {
        let settings = &config.pipeline;

        let upload = UploadStage::new(Arc::clone(&store), credentials, &config.google.folder_id)
            .with_purge_discard(settings.purge_discard_on_start)
            .with_shutdown(shutdown.clone());

        let publish = PublishStage::new(store, publisher, settings.daily_cap)
            .with_retry(RetryPolicy::new(settings.max_attempts, settings.retry_delay()))
            .with_shutdown(shutdown.clone());

        Self {
            watch_dir: config.watch_dir(),
            upload,
            publish,
            shutdown,
        }
    }

    /// Assemble a pipeline talking to Google Drive and Instagram
    pub fn from_config(config: &Config, shutdown: Shutdown) -> Self {
        Self::new(
            config,
            Arc::new(TokenFileProvider::new(config.token_file())),
            Arc::new(DriveStore::new()),
            Arc::new(GraphClient::new(&config.instagram)),
            shutdown,
        )
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub async fn upload(&self) -> Result<UploadSummary> {
        self.upload.run(&self.watch_dir).await
    }

    pub async fn publish(&self) -> Result<PublishSummary> {
        self.publish.run(&self.watch_dir).await
    }

    /// Upload, wait `delay`, publish
    ///
    /// The wait is skipped when nothing new was uploaded. An unreadable
    /// quota ends the cycle after the upload stage without an error; auth
    /// failures and cancellation are returned.
    pub async fn run_full_cycle(&self, delay: Duration) -> Result<CycleSummary> {
        let upload = self.upload().await?;

        if upload.uploaded > 0 && !delay.is_zero() {
            info!(
                "Uploaded {} files. Waiting {} seconds before publishing...",
                upload.uploaded,
                delay.as_secs()
            );
            if !self.shutdown.sleep(delay).await {
                return Err(CwallError::Cancelled);
            }
        }

        let publish = match self.publish().await {
            Ok(summary) => Some(summary),
            Err(CwallError::Quota(reason)) => {
                error!("Skipping publish stage, quota unavailable: {}", reason);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(CycleSummary { upload, publish })
    }
}

/// Every pipeline item under `watch_dir`, with its state derived from where
/// it sits: the watch directory, `discard/` and each dated archive folder
pub fn scan_items(watch_dir: &Path) -> Result<Vec<ScreenshotItem>> {
    let mut dirs = vec![watch_dir.to_path_buf(), naming::discard_dir(watch_dir)];
    let archive_root = naming::archive_root(watch_dir);
    if archive_root.is_dir() {
        let mut dated: Vec<_> = std::fs::read_dir(&archive_root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dated.sort();
        dirs.extend(dated);
    }

    let mut items = Vec::new();
    for dir in dirs.iter().filter(|d| d.is_dir()) {
        items.extend(
            list_files(dir)?
                .iter()
                .filter_map(|path| naming::classify(watch_dir, path)),
        );
    }
    Ok(items)
}

/// Regular files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Path relative to the watch directory, as stored in the state log
fn relative_to(watch_dir: &Path, path: &Path) -> String {
    path.strip_prefix(watch_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
