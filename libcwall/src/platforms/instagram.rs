//! Instagram publishing through the Facebook Graph API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::InstagramConfig;
use crate::error::{CwallError, PublishError, Result};
use crate::platforms::SocialPublisher;

const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// Map a failed Graph API response onto the error taxonomy
///
/// Graph returns OAuth problems either as HTTP 401/403 or as error code 190
/// inside a 400 body, so both are inspected.
fn map_graph_error(status: reqwest::StatusCode, body: &str, context: &str) -> CwallError {
    let code = status.as_u16();

    if code == 401 || code == 403 || body.contains("\"code\":190") || body.contains("OAuthException")
    {
        return CwallError::Auth(format!(
            "Graph API rejected the access token during {}: {}. Run `cwall set_token` to store a new one.",
            context, body
        ));
    }

    if code == 429 || body.contains("\"code\":4,") || body.contains("\"code\":32,") {
        return PublishError::RateLimit(format!("{} ({}): {}", context, status, body)).into();
    }

    if status.is_server_error() {
        return PublishError::Network(format!("{} ({}): {}", context, status, body)).into();
    }

    PublishError::Rejected(format!("{} ({}): {}", context, status, body)).into()
}

fn map_transport_error(error: reqwest::Error, context: &str) -> CwallError {
    PublishError::Network(format!("{}: {}", context, error)).into()
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PublishingLimitResponse {
    #[serde(default)]
    data: Vec<PublishingLimit>,
}

#[derive(Debug, Deserialize)]
struct PublishingLimit {
    #[serde(default)]
    quota_usage: Option<u32>,
}

/// Parse a `content_publishing_limit` body into the used count
fn parse_quota_usage(body: &str) -> Result<u32> {
    let parsed: PublishingLimitResponse = serde_json::from_str(body)
        .map_err(|e| CwallError::Quota(format!("Unparseable publishing limit: {}", e)))?;
    parsed
        .data
        .first()
        .and_then(|record| record.quota_usage)
        .ok_or_else(|| CwallError::Quota("Publishing limit response has no quota_usage".to_string()))
}

pub struct GraphClient {
    http_client: reqwest::Client,
    base_url: String,
    user_id: String,
    access_token: SecretString,
}

impl GraphClient {
    pub fn new(config: &InstagramConfig) -> Self {
        Self {
            http_client: super::http_client(),
            base_url: format!("{}/{}", GRAPH_BASE_URL, config.api_version),
            user_id: config.user_id.clone(),
            access_token: SecretString::from(config.access_token.clone()),
        }
    }

    fn endpoint(&self, edge: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.user_id, edge)
    }

    async fn post_for_id(&self, url: &str, params: &[(&str, &str)], context: &str) -> Result<String> {
        let response = self
            .http_client
            .post(url)
            .query(params)
            .query(&[("access_token", self.access_token.expose_secret())])
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, context))?;
        if !status.is_success() {
            return Err(map_graph_error(status, &body, context));
        }

        let parsed: IdResponse = serde_json::from_str(&body).map_err(|e| {
            PublishError::Rejected(format!("{}: unexpected response {}: {}", context, body, e))
        })?;
        Ok(parsed.id)
    }
}

#[async_trait]
impl SocialPublisher for GraphClient {
    async fn create_media(&self, image_url: &str) -> Result<String> {
        let creation_id = self
            .post_for_id(&self.endpoint("media"), &[("image_url", image_url)], "media upload")
            .await?;
        debug!("Created media container {} for {}", creation_id, image_url);
        Ok(creation_id)
    }

    async fn publish_media(&self, creation_id: &str) -> Result<String> {
        let media_id = self
            .post_for_id(
                &self.endpoint("media_publish"),
                &[("creation_id", creation_id)],
                "media publish",
            )
            .await?;
        info!("Published media to Instagram with ID {}", media_id);
        Ok(media_id)
    }

    async fn used_quota(&self) -> Result<u32> {
        let response = self
            .http_client
            .get(self.endpoint("content_publishing_limit"))
            .query(&[("access_token", self.access_token.expose_secret())])
            .send()
            .await
            .map_err(|e| CwallError::Quota(format!("Publishing limit request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CwallError::Quota(format!("Publishing limit read failed: {}", e)))?;
        if !status.is_success() {
            return Err(CwallError::Quota(format!(
                "Error in retrieving quota ({}): {}",
                status, body
            )));
        }

        parse_quota_usage(&body)
    }

    async fn validate_token(&self) -> bool {
        let url = format!("{}/me", self.base_url);
        match self
            .http_client
            .get(&url)
            .query(&[("access_token", self.access_token.expose_secret())])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!("Error in testing access token: {}", body);
                false
            }
            Err(e) => {
                tracing::error!("Error in testing access token: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "instagram"
    }
}
