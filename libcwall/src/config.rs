//! Configuration management for cwall

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Folder the phone drops screenshots into
    pub watch_dir: String,
    pub google: GoogleConfig,
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Drive folder that receives the normalized images
    pub folder_id: String,
    /// Authorized-user token file (access + refresh token)
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub user_id: String,
    pub access_token: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_inter_stage_delay")]
    pub inter_stage_delay_secs: u64,
    #[serde(default = "default_daily_cap")]
    pub daily_cap: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Empty `discard/` before every upload pass
    #[serde(default)]
    pub purge_discard_on_start: bool,
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_inter_stage_delay() -> u64 {
    30
}

fn default_daily_cap() -> u32 {
    crate::quota::DAILY_CAP
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_stage_delay_secs: default_inter_stage_delay(),
            daily_cap: default_daily_cap(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            purge_discard_on_start: false,
        }
    }
}

impl PipelineConfig {
    pub fn inter_stage_delay(&self) -> Duration {
        Duration::from_secs(self.inter_stage_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration back to disk
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, content)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Copy of this configuration carrying a fresh Graph API access token
    pub fn with_access_token(&self, access_token: String) -> Self {
        let mut updated = self.clone();
        updated.instagram.access_token = access_token;
        updated
    }

    /// Watch directory with `~` expanded
    pub fn watch_dir(&self) -> PathBuf {
        expand_path(&self.watch_dir)
    }

    /// Token file path with `~` expanded
    pub fn token_file(&self) -> PathBuf {
        expand_path(&self.google.token_file)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("watch_dir", &self.watch_dir),
            ("google.folder_id", &self.google.folder_id),
            ("google.token_file", &self.google.token_file),
            ("instagram.user_id", &self.instagram.user_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name.to_string()).into());
            }
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::MissingField(
                "pipeline.max_attempts must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path: `$CWALL_CONFIG`, else the XDG config dir
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CWALL_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("cwall").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CwallError;
    use serial_test::serial;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
watch_dir = "/tmp/screens"

[google]
folder_id = "folder123"
token_file = "/tmp/token.json"

[instagram]
user_id = "1789"
access_token = "EAAB"
"#;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL);

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.watch_dir(), PathBuf::from("/tmp/screens"));
        assert_eq!(config.instagram.api_version, "v18.0");
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.pipeline.daily_cap, 50);
        assert_eq!(config.pipeline.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.pipeline.inter_stage_delay(), Duration::from_secs(30));
        assert!(!config.pipeline.purge_discard_on_start);
    }

    #[test]
    fn test_pipeline_overrides() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}\n[pipeline]\ninter_stage_delay_secs = 3\npurge_discard_on_start = true\n",
            MINIMAL
        );
        let path = write_config(&dir, &content);

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.pipeline.inter_stage_delay_secs, 3);
        assert!(config.pipeline.purge_discard_on_start);
        assert_eq!(config.pipeline.max_attempts, 3);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &MINIMAL.replace("folder123", ""));

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("google.folder_id"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "watch_dir = [[[");

        match Config::load_from_path(&path) {
            Err(CwallError::Config(ConfigError::ParseError(_))) => {}
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        match Config::load_from_path(&dir.path().join("absent.toml")) {
            Err(CwallError::Config(ConfigError::ReadError(_))) => {}
            other => panic!("Expected read error, got {:?}", other),
        }
    }

    #[test]
    fn test_with_access_token_saves_updated_copy() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL);
        let original = Config::load_from_path(&path).unwrap();

        let updated = original.with_access_token("EAAC-new".to_string());
        assert_eq!(original.instagram.access_token, "EAAB");
        assert_eq!(updated.instagram.access_token, "EAAC-new");

        updated.save_to_path(&path).unwrap();
        let reloaded = Config::load_from_path(&path).unwrap();
        assert_eq!(reloaded.instagram.access_token, "EAAC-new");
        assert_eq!(reloaded.google.folder_id, "folder123");
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("CWALL_CONFIG", "/tmp/custom/cwall.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("CWALL_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/custom/cwall.toml"));
    }

    #[test]
    #[serial]
    fn test_load_uses_env_path() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL);

        std::env::set_var("CWALL_CONFIG", &path);
        let result = Config::load();
        std::env::remove_var("CWALL_CONFIG");

        assert_eq!(result.unwrap().watch_dir, "/tmp/screens");
    }
}
