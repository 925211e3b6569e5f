//! Mock collaborators for testing
//!
//! Configurable doubles for the object store, the publisher and the
//! credential provider. Counters live behind `Arc<Mutex<_>>` so a test can
//! keep a clone of the config and inspect calls after handing the mock to
//! the pipeline.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::error::{CwallError, PublishError, Result};
use crate::platforms::{Credential, CredentialProvider, ObjectStore, SocialPublisher};

/// Configuration for mock object store behavior
#[derive(Debug, Clone)]
pub struct MockStoreConfig {
    /// Whether uploads succeed unless the file is listed in `failing_files`
    pub upload_succeeds: bool,

    /// File names whose upload always fails
    pub failing_files: Vec<String>,

    /// Ids handed out in order; generated ids are used once this runs dry
    pub ids: Arc<Mutex<VecDeque<String>>>,

    /// Files that were uploaded, in call order
    pub uploaded: Arc<Mutex<Vec<PathBuf>>>,

    /// Number of times upload has been called
    pub upload_call_count: Arc<Mutex<usize>>,
}

impl Default for MockStoreConfig {
    fn default() -> Self {
        Self {
            upload_succeeds: true,
            failing_files: Vec::new(),
            ids: Arc::new(Mutex::new(VecDeque::new())),
            uploaded: Arc::new(Mutex::new(Vec::new())),
            upload_call_count: Arc::new(Mutex::new(0)),
        }
    }
}

/// Mock object store
pub struct MockStore {
    config: MockStoreConfig,
}

impl MockStore {
    pub fn new(config: MockStoreConfig) -> Self {
        Self { config }
    }

    /// A store that accepts everything
    pub fn success() -> Self {
        Self::new(MockStoreConfig::default())
    }

    /// A store that returns the given ids in order
    pub fn with_ids(ids: &[&str]) -> Self {
        Self::new(MockStoreConfig {
            ids: Arc::new(Mutex::new(ids.iter().map(|s| s.to_string()).collect())),
            ..Default::default()
        })
    }

    /// A store that rejects every upload
    pub fn failure() -> Self {
        Self::new(MockStoreConfig {
            upload_succeeds: false,
            ..Default::default()
        })
    }

    pub fn upload_call_count(&self) -> usize {
        *self.config.upload_call_count.lock().unwrap()
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.config.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn upload(
        &self,
        path: &Path,
        _folder_id: &str,
        _credential: &Credential,
    ) -> Result<String> {
        let call = {
            let mut count = self.config.upload_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !path.exists() {
            return Err(CwallError::Upload(format!("{} does not exist", path.display())));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.config.upload_succeeds || self.config.failing_files.contains(&name) {
            return Err(CwallError::Upload(format!("Mock upload of {} failed", name)));
        }

        self.config.uploaded.lock().unwrap().push(path.to_path_buf());
        let id = self
            .config
            .ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("mock{}", call));
        Ok(id)
    }

    fn public_url(&self, object_id: &str) -> String {
        format!("https://mock.store/{}", object_id)
    }
}

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockPublisherConfig {
    pub name: String,

    /// Value reported by `used_quota`; `None` simulates an unavailable quota
    pub used_quota: Option<u32>,

    /// Whether the access token validates
    pub token_valid: bool,

    /// Image URLs containing any of these fragments always fail to publish
    pub failing_urls: Vec<String>,

    /// Transient failures to produce before attempts start succeeding
    pub failures_before_success: Arc<Mutex<usize>>,

    /// Fail with an authentication error instead of a publish error
    pub auth_failure: bool,

    /// Number of times create_media has been called
    pub create_call_count: Arc<Mutex<usize>>,

    /// Clock reading of every create_media call (attempt start)
    pub attempt_times: Arc<Mutex<Vec<Instant>>>,

    /// Image URLs that were published, in order
    pub published_urls: Arc<Mutex<Vec<String>>>,

    /// Number of times used_quota has been called
    pub quota_call_count: Arc<Mutex<usize>>,

    /// Pending containers: creation id -> image URL
    pub creations: Arc<Mutex<HashMap<String, String>>>,
}

impl Default for MockPublisherConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            used_quota: Some(0),
            token_valid: true,
            failing_urls: Vec::new(),
            failures_before_success: Arc::new(Mutex::new(0)),
            auth_failure: false,
            create_call_count: Arc::new(Mutex::new(0)),
            attempt_times: Arc::new(Mutex::new(Vec::new())),
            published_urls: Arc::new(Mutex::new(Vec::new())),
            quota_call_count: Arc::new(Mutex::new(0)),
            creations: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Mock publisher
pub struct MockPublisher {
    config: MockPublisherConfig,
}

impl MockPublisher {
    pub fn new(config: MockPublisherConfig) -> Self {
        Self { config }
    }

    /// A publisher with `used` posts already consumed today
    pub fn with_used_quota(used: u32) -> Self {
        Self::new(MockPublisherConfig {
            used_quota: Some(used),
            ..Default::default()
        })
    }

    /// A publisher whose quota endpoint is down
    pub fn quota_unavailable() -> Self {
        Self::new(MockPublisherConfig {
            used_quota: None,
            ..Default::default()
        })
    }

    /// A publisher that rejects every publish attempt
    pub fn always_failing() -> Self {
        Self::new(MockPublisherConfig {
            failing_urls: vec![String::new()],
            ..Default::default()
        })
    }

    pub fn create_call_count(&self) -> usize {
        *self.config.create_call_count.lock().unwrap()
    }

    pub fn quota_call_count(&self) -> usize {
        *self.config.quota_call_count.lock().unwrap()
    }

    pub fn published_urls(&self) -> Vec<String> {
        self.config.published_urls.lock().unwrap().clone()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.config.attempt_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocialPublisher for MockPublisher {
    async fn create_media(&self, image_url: &str) -> Result<String> {
        let call = {
            let mut count = self.config.create_call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.config.attempt_times.lock().unwrap().push(Instant::now());

        if self.config.auth_failure {
            return Err(CwallError::Auth("Mock token expired".to_string()));
        }

        if self
            .config
            .failing_urls
            .iter()
            .any(|fragment| image_url.contains(fragment.as_str()))
        {
            return Err(PublishError::Rejected(format!("Mock rejected {}", image_url)).into());
        }

        {
            let mut remaining = self.config.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PublishError::Network("Mock connection reset".to_string()).into());
            }
        }

        let creation_id = format!("creation{}", call);
        self.config
            .creations
            .lock()
            .unwrap()
            .insert(creation_id.clone(), image_url.to_string());
        Ok(creation_id)
    }

    async fn publish_media(&self, creation_id: &str) -> Result<String> {
        let url = self
            .config
            .creations
            .lock()
            .unwrap()
            .remove(creation_id)
            .ok_or_else(|| PublishError::Rejected(format!("Unknown creation id {}", creation_id)))?;

        self.config.published_urls.lock().unwrap().push(url);
        Ok(format!("media-{}", creation_id))
    }

    async fn used_quota(&self) -> Result<u32> {
        *self.config.quota_call_count.lock().unwrap() += 1;
        self.config
            .used_quota
            .ok_or_else(|| CwallError::Quota("Mock quota endpoint unavailable".to_string()))
    }

    async fn validate_token(&self) -> bool {
        self.config.token_valid
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

/// Mock credential provider
#[derive(Debug, Clone)]
pub struct MockCredentials {
    succeeds: bool,
    call_count: Arc<Mutex<usize>>,
}

impl MockCredentials {
    pub fn success() -> Self {
        Self {
            succeeds: true,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failure() -> Self {
        Self {
            succeeds: false,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl CredentialProvider for MockCredentials {
    async fn valid_credential(&self) -> Result<Credential> {
        *self.call_count.lock().unwrap() += 1;
        if self.succeeds {
            Ok(Credential::new("mock-token", None))
        } else {
            Err(CwallError::Auth("Mock credential refresh failed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_store_hands_out_ids_in_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("IMG001.JPEG");
        std::fs::write(&file, b"x").unwrap();
        let store = MockStore::with_ids(&["first"]);
        let credential = Credential::new("t", None);

        assert_eq!(store.upload(&file, "f", &credential).await.unwrap(), "first");
        assert_eq!(store.upload(&file, "f", &credential).await.unwrap(), "mock2");
        assert_eq!(store.upload_call_count(), 2);
        assert_eq!(store.uploaded().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_store_failure() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("IMG001.JPEG");
        std::fs::write(&file, b"x").unwrap();

        let result = MockStore::failure()
            .upload(&file, "f", &Credential::new("t", None))
            .await;
        assert!(matches!(result, Err(CwallError::Upload(_))));
    }

    #[tokio::test]
    async fn test_mock_publisher_transient_failures_then_success() {
        let config = MockPublisherConfig {
            failures_before_success: Arc::new(Mutex::new(1)),
            ..Default::default()
        };
        let publisher = MockPublisher::new(config);

        let first = publisher.create_media("https://mock.store/a").await;
        assert!(first.unwrap_err().is_transient());

        let creation = publisher.create_media("https://mock.store/a").await.unwrap();
        publisher.publish_media(&creation).await.unwrap();
        assert_eq!(publisher.published_urls(), vec!["https://mock.store/a".to_string()]);
        assert_eq!(publisher.create_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_publisher_quota() {
        assert_eq!(MockPublisher::with_used_quota(7).used_quota().await.unwrap(), 7);
        assert!(matches!(
            MockPublisher::quota_unavailable().used_quota().await,
            Err(CwallError::Quota(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_credentials() {
        let ok = MockCredentials::success();
        assert!(ok.valid_credential().await.is_ok());
        assert_eq!(ok.call_count(), 1);

        assert!(matches!(
            MockCredentials::failure().valid_credential().await,
            Err(CwallError::Auth(_))
        ));
    }
}
