//! Upload stage: raw captures -> squared copies stored remotely
//!
//! For every raw capture the original is first moved into `discard/`, the
//! squared copy is written back into the watch directory and uploaded, and
//! on success renamed so that its name carries the remote object id. An item
//! whose upload fails stays quarantined and is not retried by later runs.
//! A quarantined original is never replaced: a capture that reuses its name
//! goes to the next free slot (`discard/IMG001.1.jpg`).

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CwallError, Result};
use crate::imaging;
use crate::naming;
use crate::platforms::{Credential, CredentialProvider, ObjectStore};
use crate::shutdown::Shutdown;
use crate::state_log::{StateLog, StateRecord};
use crate::types::ItemState;

use super::{file_name, list_files, relative_to};

/// Tallies of one upload pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Raw captures found in the watch directory
    pub discovered: usize,
    /// Items that now sit in the watch directory under an encoded name
    pub uploaded: usize,
    /// Items left in quarantine after a processing or upload failure
    pub failed: usize,
    /// Captures left untouched because their name cannot carry a remote id
    pub skipped: usize,
}

pub struct UploadStage {
    store: Arc<dyn ObjectStore>,
    credentials: Arc<dyn CredentialProvider>,
    folder_id: String,
    purge_discard: bool,
    shutdown: Shutdown,
}

impl UploadStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credentials: Arc<dyn CredentialProvider>,
        folder_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            folder_id: folder_id.into(),
            purge_discard: false,
            shutdown: Shutdown::new(),
        }
    }

    /// Empty `discard/` before each pass. Quarantined originals are lost.
    pub fn with_purge_discard(mut self, purge: bool) -> Self {
        self.purge_discard = purge;
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
    /// Fails with `CwallError::Auth` when no credential can be obtained and
    /// with `CwallError::Cancelled` on shutdown. Per-item failures are logged
    /// and counted, never returned.
    pub async fn run(&self, watch_dir: &Path) -> Result<UploadSummary> {
        let discard_dir = naming::discard_dir(watch_dir);
        if self.purge_discard {
            purge_dir(&discard_dir)?;
        }

        let raw_files: Vec<_> = list_files(watch_dir)?
            .into_iter()
            .filter(|path| file_name(path).is_some_and(naming::is_raw_capture))
            .collect();

        let mut summary = UploadSummary {
            discovered: raw_files.len(),
            ..Default::default()
        };
        if raw_files.is_empty() {
            info!("No raw screenshots in {}", watch_dir.display());
            return Ok(summary);
        }
        info!("Found {} raw screenshots in {}", raw_files.len(), watch_dir.display());

        let credential = self.credentials.valid_credential().await?;
        std::fs::create_dir_all(&discard_dir)?;
        let log = StateLog::for_watch_dir(watch_dir);

        for raw_path in raw_files {
            if self.shutdown.is_requested() {
                return Err(CwallError::Cancelled);
            }
            let Some(name) = file_name(&raw_path) else {
                continue;
            };

            if let Err(e) = naming::encodable_basename(name) {
                warn!("Leaving {} in place: {}", name, e);
                summary.skipped += 1;
                continue;
            }

            match self.upload_item(watch_dir, name, &credential, &log).await {
                Ok(encoded) => {
                    info!("{} uploaded as {}", name, encoded);
                    summary.uploaded += 1;
                }
                Err(e @ CwallError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!("{} dropped from the pipeline: {}", name, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Upload pass finished: {} discovered, {} uploaded, {} failed, {} skipped",
            summary.discovered, summary.uploaded, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Quarantine, square, upload and rename one capture. Returns the
    /// encoded filename.
    async fn upload_item(
        &self,
        watch_dir: &Path,
        name: &str,
        credential: &Credential,
        log: &StateLog,
    ) -> Result<String> {
        naming::encodable_basename(name)?;
        let raw_path = watch_dir.join(name);
        let quarantined = naming::quarantine_path(watch_dir, name)?;
        let key = file_name(&quarantined)
            .and_then(naming::item_key)
            .unwrap_or_else(|| name.to_string());

        std::fs::rename(&raw_path, &quarantined)?;
        log.record(StateRecord::new(
            &key,
            ItemState::Quarantined,
            relative_to(watch_dir, &quarantined),
        ));

        let normalized = watch_dir.join(naming::normalized_name(name)?);
        let uploaded = async {
            imaging::process_image(&quarantined, &normalized)?;
            let remote_id = self
                .store
                .upload(&normalized, &self.folder_id, credential)
                .await?;
            naming::encode(&remote_id, name).map(|encoded| (remote_id, encoded))
        }
        .await;

        let (remote_id, encoded) = match uploaded {
            Ok(result) => result,
            Err(e) => {
                remove_if_present(&normalized);
                return Err(e);
            }
        };

        let encoded_path = watch_dir.join(&encoded);
        std::fs::rename(&normalized, &encoded_path)?;
        log.record(
            StateRecord::new(&key, ItemState::Uploaded, relative_to(watch_dir, &encoded_path))
                .with_remote_id(remote_id),
        );
        Ok(encoded)
    }
}

fn purge_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let removed = list_files(dir)?.len();
    std::fs::remove_dir_all(dir)?;
    std::fs::create_dir_all(dir)?;
    info!("Purged {} quarantined files from {}", removed, dir.display());
    Ok(())
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
