//! Core types for cwall

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a screenshot sits in the pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Freshly captured, not yet processed
    Raw,
    /// Squared copy stored remotely, id encoded in the filename
    Uploaded,
    /// Original superseded by its normalized copy (or dropped after a failed upload)
    Quarantined,
    /// Posted and archived under today's date
    Published,
    /// Every publish attempt failed in the last run; still eligible next run
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Raw => "raw",
            ItemState::Uploaded => "uploaded",
            ItemState::Quarantined => "quarantined",
            ItemState::Published => "published",
            ItemState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(ItemState::Raw),
            "uploaded" => Ok(ItemState::Uploaded),
            "quarantined" => Ok(ItemState::Quarantined),
            "published" => Ok(ItemState::Published),
            "failed" => Ok(ItemState::Failed),
            _ => Err(format!(
                "Invalid state: '{}'. Valid options: raw, uploaded, quarantined, published, failed",
                s
            )),
        }
    }
}

/// A screenshot file together with the state derived from its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotItem {
    pub path: PathBuf,
    pub state: ItemState,
    /// Present once the item is `Uploaded` (or later)
    pub remote_id: Option<String>,
}

impl ScreenshotItem {
    /// Filename as a string, empty if the path has none
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Today's publishing allowance as reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaWindow {
    pub date: NaiveDate,
    pub used: u32,
    pub cap: u32,
}

impl QuotaWindow {
    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_state_parse_and_display() {
        for state in [
            ItemState::Raw,
            ItemState::Uploaded,
            ItemState::Quarantined,
            ItemState::Published,
            ItemState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<ItemState>().unwrap(), state);
        }
        assert!("archived".parse::<ItemState>().is_err());
    }

    #[test]
    fn test_item_state_serializes_snake_case() {
        let json = serde_json::to_string(&ItemState::Quarantined).unwrap();
        assert_eq!(json, "\"quarantined\"");
    }

    #[test]
    fn test_quota_window_remaining() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let window = QuotaWindow { date, used: 10, cap: 50 };
        assert_eq!(window.remaining(), 40);
        assert!(!window.is_exhausted());

        let at_cap = QuotaWindow { date, used: 50, cap: 50 };
        assert_eq!(at_cap.remaining(), 0);
        assert!(at_cap.is_exhausted());

        let over_cap = QuotaWindow { date, used: 53, cap: 50 };
        assert_eq!(over_cap.remaining(), 0);
    }

    #[test]
    fn test_screenshot_item_file_name() {
        let item = ScreenshotItem {
            path: PathBuf::from("/shots/IMG001-abc.JPEG"),
            state: ItemState::Uploaded,
            remote_id: Some("abc".to_string()),
        };
        assert_eq!(item.file_name(), "IMG001-abc.JPEG");
    }
}
