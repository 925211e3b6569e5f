//! Google Drive object store and OAuth token file handling
//!
//! Uses raw HTTP requests against the Drive v3 and OAuth endpoints. The
//! token file is the "authorized user" JSON written by Google's installed-app
//! flow; creating it the first time happens outside this tool.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CwallError, Result};
use crate::platforms::{Credential, CredentialProvider, ObjectStore};

const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Authorized-user token file contents
///
/// Unknown fields are preserved so that rewriting the file after a refresh
/// does not drop anything other tools put there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizedUserToken {
    /// Whether the access token is missing or about to expire at `now`
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (None, _) => true,
            (Some(token), _) if token.is_empty() => true,
            (Some(_), None) => false,
            (Some(_), Some(expiry)) => expiry <= now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS),
        }
    }

    fn credential(&self) -> Option<Credential> {
        self.token
            .as_ref()
            .map(|token| Credential::new(token.clone(), self.expiry))
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Credential provider backed by an authorized-user token file
pub struct TokenFileProvider {
    path: PathBuf,
    http_client: reqwest::Client,
}

impl TokenFileProvider {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            http_client: super::http_client(),
        }
    }

    fn load(&self) -> Result<AuthorizedUserToken> {
        if !self.path.exists() {
            return Err(CwallError::Auth(format!(
                "Google token file not found: {}. Complete the Google OAuth consent flow once to create it.",
                self.path.display()
            )));
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CwallError::Auth(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CwallError::Auth(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, token: &AuthorizedUserToken) -> Result<()> {
        let content = serde_json::to_string(token)
            .map_err(|e| CwallError::Auth(format!("Failed to serialize token: {}", e)))?;
        std::fs::write(&self.path, content).map_err(|e| {
            CwallError::Auth(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    /// Exchange the refresh token for a new access token, returning the
    /// updated token file contents
    async fn refresh(&self, token: &AuthorizedUserToken) -> Result<AuthorizedUserToken> {
        let missing = |field: &str| {
            CwallError::Auth(format!(
                "{} has no {}; re-run the Google OAuth consent flow",
                self.path.display(),
                field
            ))
        };
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| missing("refresh_token"))?;
        let client_id = token.client_id.as_deref().ok_or_else(|| missing("client_id"))?;
        let client_secret = token
            .client_secret
            .as_deref()
            .ok_or_else(|| missing("client_secret"))?;

        info!("Refreshing Google access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self
            .http_client
            .post(&token.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| CwallError::Auth(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CwallError::Auth(format!(
                "Token refresh rejected ({}): {}",
                status, body
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| CwallError::Auth(format!("Failed to parse token response: {}", e)))?;

        let mut updated = token.clone();
        updated.token = Some(refreshed.access_token);
        updated.expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        Ok(updated)
    }
}

#[async_trait]
impl CredentialProvider for TokenFileProvider {
    async fn valid_credential(&self) -> Result<Credential> {
        let token = self.load()?;

        let token = if token.needs_refresh(Utc::now()) {
            let refreshed = self.refresh(&token).await?;
            self.save(&refreshed)?;
            refreshed
        } else {
            debug!("Using cached Google access token");
            token
        };

        token
            .credential()
            .ok_or_else(|| CwallError::Auth("Token file holds no access token".to_string()))
    }
}

/// Google Drive as the object store
pub struct DriveStore {
    http_client: reqwest::Client,
    upload_url: String,
}

impl DriveStore {
    pub fn new() -> Self {
        Self {
            http_client: super::http_client(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
        }
    }
}

impl Default for DriveStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Body of a Drive `uploadType=multipart` request: JSON metadata part
/// followed by the image bytes, as `multipart/related`
fn multipart_related_body(boundary: &str, metadata: &serde_json::Value, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: image/jpeg\r\n\r\n",
            b = boundary,
            m = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn upload(
        &self,
        path: &Path,
        folder_id: &str,
        credential: &Credential,
    ) -> Result<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CwallError::Upload(format!("{} has no file name", path.display())))?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CwallError::Upload(format!("Failed to read {}: {}", path.display(), e)))?;

        let metadata = serde_json::json!({ "name": name, "parents": [folder_id] });
        let boundary = format!("cwall-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, &data);

        let response = self
            .http_client
            .post(&self.upload_url)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .bearer_auth(credential.access_token.expose_secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| CwallError::Upload(format!("Drive upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CwallError::Upload(format!(
                "Drive rejected {} ({}): {}",
                name, status, text
            )));
        }

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| CwallError::Upload(format!("Failed to parse Drive response: {}", e)))?;

        info!(
            "Uploaded {} to Google Drive with file ID {}",
            path.display(),
            created.id
        );
        Ok(created.id)
    }

    fn public_url(&self, object_id: &str) -> String {
        format!("https://drive.google.com/uc?id={}", object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token_json(expiry: &str) -> String {
        format!(
            r#"{{"token":"ya29.cached","refresh_token":"1//rt","client_id":"cid","client_secret":"cs","scopes":["https://www.googleapis.com/auth/drive"],"expiry":"{}"}}"#,
            expiry
        )
    }

    #[test]
    fn test_needs_refresh() {
        let now = Utc::now();
        let mut token: AuthorizedUserToken =
            serde_json::from_str(&token_json("2099-01-01T00:00:00Z")).unwrap();
        assert!(!token.needs_refresh(now));

        token.expiry = Some(now + ChronoDuration::seconds(30));
        assert!(token.needs_refresh(now), "inside the safety margin");

        token.expiry = None;
        assert!(!token.needs_refresh(now));

        token.token = None;
        assert!(token.needs_refresh(now));
    }

    #[test]
    fn test_token_file_preserves_unknown_fields() {
        let token: AuthorizedUserToken =
            serde_json::from_str(&token_json("2099-01-01T00:00:00Z")).unwrap();
        assert_eq!(token.token_uri, DEFAULT_TOKEN_URI);
        assert!(token.extra.contains_key("scopes"));

        let written = serde_json::to_value(&token).unwrap();
        assert!(written.get("scopes").is_some());
    }

    #[tokio::test]
    async fn test_missing_token_file_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let provider = TokenFileProvider::new(dir.path().join("token.json"));

        match provider.valid_credential().await {
            Err(CwallError::Auth(msg)) => assert!(msg.contains("not found")),
            other => panic!("Expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_without_refresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, token_json("2099-01-01T00:00:00Z")).unwrap();

        let credential = TokenFileProvider::new(path).valid_credential().await.unwrap();
        assert_eq!(credential.access_token.expose_secret(), "ya29.cached");
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token":"old","expiry":"2000-01-01T00:00:00Z","client_id":"cid","client_secret":"cs"}"#,
        )
        .unwrap();

        match TokenFileProvider::new(path).valid_credential().await {
            Err(CwallError::Auth(msg)) => assert!(msg.contains("refresh_token")),
            other => panic!("Expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_multipart_related_body_layout() {
        let metadata = serde_json::json!({ "name": "IMG001.JPEG", "parents": ["f1"] });
        let body = multipart_related_body("XYZ", &metadata, b"\xff\xd8jpeg");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--XYZ\r\nContent-Type: application/json"));
        assert!(text.contains(r#""parents":["f1"]"#));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\n"));
        assert!(text.ends_with("\r\n--XYZ--\r\n"));
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            DriveStore::new().public_url("abc123"),
            "https://drive.google.com/uc?id=abc123"
        );
    }
}
