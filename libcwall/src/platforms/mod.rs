//! Remote collaborators of the pipeline
//!
//! The pipeline only talks to these traits. `drive` and `instagram` hold the
//! HTTP implementations; `mock` holds configurable doubles for tests.
//!
//! ```no_run
//! use libcwall::platforms::{CredentialProvider, ObjectStore, SocialPublisher};
//!
//! # async fn example(
//! #     credentials: &dyn CredentialProvider,
//! #     store: &dyn ObjectStore,
//! #     publisher: &dyn SocialPublisher,
//! # ) -> libcwall::Result<()> {
//! let credential = credentials.valid_credential().await?;
//! let id = store
//!     .upload("IMG001.JPEG".as_ref(), "folder123", &credential)
//!     .await?;
//! let creation_id = publisher.create_media(&store.public_url(&id)).await?;
//! publisher.publish_media(&creation_id).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

pub mod drive;
pub mod instagram;

// Mock collaborators are available for all builds to support integration tests
pub mod mock;

/// Upper bound for one HTTP exchange with Drive or the Graph API
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client shared by the remote collaborators, bounded by [`REQUEST_TIMEOUT`]
pub fn http_client() -> reqwest::Client {
    client_builder(REQUEST_TIMEOUT).build().unwrap_or_else(|e| {
        warn!("Falling back to an HTTP client without timeouts: {}", e);
        reqwest::Client::new()
    })
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
}

/// Bearer credential for the object store
#[derive(Debug)]
pub struct Credential {
    pub access_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_at,
        }
    }
}

/// Supplies a currently valid store credential, refreshing it if needed
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `CwallError::Auth` when no usable credential can be produced.
    /// Callers treat this as fatal for the run.
    async fn valid_credential(&self) -> Result<Credential>;
}

/// Cloud file store that receives the normalized images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `path` into `folder_id` and return the new object's id
    ///
    /// # Errors
    ///
    /// Returns `CwallError::Upload` if the object could not be created.
    async fn upload(&self, path: &Path, folder_id: &str, credential: &Credential)
        -> Result<String>;

    /// URL under which the publisher can fetch the object
    fn public_url(&self, object_id: &str) -> String;
}

/// Social-media publishing endpoint with a shared daily quota
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Create a media container for the image at `image_url`, returning its creation id
    async fn create_media(&self, image_url: &str) -> Result<String>;

    /// Publish a previously created container, returning the published media id
    async fn publish_media(&self, creation_id: &str) -> Result<String>;

    /// Posts already consumed today against the daily cap
    ///
    /// # Errors
    ///
    /// Returns `CwallError::Quota` when the service errors or returns no usable record.
    async fn used_quota(&self) -> Result<u32>;

    /// Whether the configured access token is still accepted
    async fn validate_token(&self) -> bool;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let err = client_builder(Duration::from_millis(200))
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }
}
