//! Error types for cwall

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CwallError>;

#[derive(Error, Debug)]
pub enum CwallError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential acquisition or refresh failed. Fatal for the run.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A single item could not be stored remotely.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The remote publishing limit could not be read.
    #[error("Quota unavailable: {0}")]
    Quota(String),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// A filename does not follow the pipeline naming convention.
    #[error("Malformed state: {0}")]
    MalformedState(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CwallError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CwallError::Auth(_) => 2,
            CwallError::MalformedState(_) => 3,
            CwallError::Quota(_) => 4,
            CwallError::Cancelled => 130,
            CwallError::Config(_)
            | CwallError::Upload(_)
            | CwallError::Publish(_)
            | CwallError::Image(_)
            | CwallError::Io(_) => 1,
        }
    }

    /// Whether a retry of the same operation may succeed
    ///
    /// Every publish failure qualifies: the remote side frequently rejects
    /// media that it cannot fetch yet.
    pub fn is_transient(&self) -> bool {
        matches!(self, CwallError::Publish(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Media rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl From<image::ImageError> for CwallError {
    fn from(e: image::ImageError) -> Self {
        CwallError::Image(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_auth() {
        let error = CwallError::Auth("token.json not found".to_string());
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_malformed_state() {
        let error = CwallError::MalformedState("IMG001.png".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_quota() {
        let error = CwallError::Quota("no data".to_string());
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_cancelled() {
        assert_eq!(CwallError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_exit_code_item_level_errors() {
        assert_eq!(CwallError::Upload("x".to_string()).exit_code(), 1);
        assert_eq!(
            CwallError::Publish(PublishError::Network("x".to_string())).exit_code(),
            1
        );
        assert_eq!(CwallError::Image("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_publish() {
        let error: CwallError = PublishError::Rejected("media not ready".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Publish error: Media rejected: media not ready"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error: CwallError = ConfigError::MissingField("google.folder_id".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: google.folder_id"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(CwallError::Publish(PublishError::RateLimit("429".to_string())).is_transient());
        assert!(CwallError::Publish(PublishError::Network("timeout".to_string())).is_transient());
        assert!(!CwallError::Auth("expired".to_string()).is_transient());
        assert!(!CwallError::Quota("down".to_string()).is_transient());
        assert!(!CwallError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match CwallError::from(io) {
            CwallError::Io(_) => {}
            other => panic!("Expected CwallError::Io, got {:?}", other),
        }
    }
}
