//! Filename and directory conventions that encode pipeline state
//!
//! There is no index on disk besides the filesystem itself, so these rules
//! have to stay compatible with trees written by earlier versions:
//!
//! | State       | Location                                              |
//! |-------------|-------------------------------------------------------|
//! | Raw         | `<watch_dir>/IMG*.jpg` (any case, `.jpeg` too)        |
//! | Quarantined | `<watch_dir>/discard/<original_filename>`             |
//! | Uploaded    | `<watch_dir>/<basename>-<remote_id>.JPEG`             |
//! | Published   | `<watch_dir>/cwall_image_archive/<YYYY-MM-DD>/<file>` |

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::error::{CwallError, Result};
use crate::types::{ItemState, ScreenshotItem};

pub const RAW_PREFIX: &str = "IMG";
pub const DELIMITER: char = '-';
pub const NORMALIZED_EXTENSION: &str = "JPEG";
pub const DISCARD_DIR: &str = "discard";
pub const ARCHIVE_DIR: &str = "cwall_image_archive";

const RAW_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Does `name` look like a screenshot that has not entered the pipeline yet?
///
/// A leftover normalized copy (`IMG001.JPEG`) also counts: squaring it again
/// is harmless and picks the item back up after an interrupted run.
pub fn is_raw_capture(name: &str) -> bool {
    let path = Path::new(name);
    let has_raw_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RAW_EXTENSIONS.iter().any(|r| ext.eq_ignore_ascii_case(r)));

    name.starts_with(RAW_PREFIX) && has_raw_extension && decode(name).is_err()
}

/// `IMG001.jpg` -> `IMG001.JPEG`
pub fn normalized_name(original_name: &str) -> Result<String> {
    Ok(format!("{}.{}", basename(original_name)?, NORMALIZED_EXTENSION))
}

/// Embed a remote object id into a filename: `IMG001.jpg` + `abc123` ->
/// `IMG001-abc123.JPEG`
///
/// Basenames that already contain the delimiter are refused because they
/// could not be decoded back unambiguously.
pub fn encode(remote_id: &str, original_name: &str) -> Result<String> {
    let base = encodable_basename(original_name)?;
    validate_remote_id(remote_id)
        .map_err(|reason| CwallError::MalformedState(format!("remote id {:?}: {}", remote_id, reason)))?;

    Ok(format!(
        "{}{}{}.{}",
        base, DELIMITER, remote_id, NORMALIZED_EXTENSION
    ))
}

/// The basename `encode` would use, or `MalformedState` if it contains the
/// delimiter
pub fn encodable_basename(original_name: &str) -> Result<String> {
    let base = basename(original_name)?;
    if base.contains(DELIMITER) {
        return Err(CwallError::MalformedState(format!(
            "{}: basename contains '{}' and cannot carry a remote id",
            original_name, DELIMITER
        )));
    }
    Ok(base)
}

/// Extract the remote object id from an encoded filename
///
/// This is the only check that a file belongs to the uploaded state, so it
/// is strict: exact `.JPEG` suffix, `IMG` basename, non-empty id.
pub fn decode(derived_name: &str) -> Result<String> {
    split_encoded(derived_name)
        .map(|(_, id)| id.to_string())
        .ok_or_else(|| {
            CwallError::MalformedState(format!(
                "{} does not match <basename>{}<remote_id>.{}",
                derived_name, DELIMITER, NORMALIZED_EXTENSION
            ))
        })
}

/// Stable identity of an item across renames: the basename it was
/// quarantined under (`IMG001`, or `IMG001.1` for a reused capture name)
pub fn item_key(name: &str) -> Option<String> {
    if let Some((base, _)) = split_encoded(name) {
        return Some(base.to_string());
    }
    basename(name).ok().filter(|b| b.starts_with(RAW_PREFIX))
}

pub fn discard_dir(watch_dir: &Path) -> PathBuf {
    watch_dir.join(DISCARD_DIR)
}

pub fn archive_root(watch_dir: &Path) -> PathBuf {
    watch_dir.join(ARCHIVE_DIR)
}

/// First free quarantine slot for a capture: `discard/IMG001.jpg`, then
/// `discard/IMG001.1.jpg`, `discard/IMG001.2.jpg` and so on
pub fn quarantine_path(watch_dir: &Path, original_name: &str) -> Result<PathBuf> {
    let dir = discard_dir(watch_dir);
    let first = dir.join(original_name);
    if !first.exists() {
        return Ok(first);
    }

    let base = basename(original_name)?;
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    (1u32..)
        .map(|n| dir.join(format!("{}.{}.{}", base, n, extension)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| {
            CwallError::MalformedState(format!("No free quarantine slot for {}", original_name))
        })
}

/// `<watch_dir>/cwall_image_archive/<YYYY-MM-DD>`
pub fn archive_dir_for(watch_dir: &Path, date: NaiveDate) -> PathBuf {
    archive_root(watch_dir).join(date.format("%Y-%m-%d").to_string())
}

/// Derive an item's state from where it sits and what it is called
///
/// Returns `None` for files that are not part of the pipeline. `Failed` is
/// never returned: on disk a failed item is indistinguishable from one that
/// is still waiting to be published.
pub fn classify(watch_dir: &Path, path: &Path) -> Option<ScreenshotItem> {
    let name = path.file_name()?.to_str()?;
    let parent = path.parent()?;

    let item = |state, remote_id| ScreenshotItem {
        path: path.to_path_buf(),
        state,
        remote_id,
    };

    if parent == watch_dir {
        if let Ok(id) = decode(name) {
            return Some(item(ItemState::Uploaded, Some(id)));
        }
        if is_raw_capture(name) {
            return Some(item(ItemState::Raw, None));
        }
        return None;
    }

    if parent == discard_dir(watch_dir) {
        return name
            .starts_with(RAW_PREFIX)
            .then(|| item(ItemState::Quarantined, None));
    }

    let in_archive = parent.parent() == Some(archive_root(watch_dir).as_path())
        && parent
            .file_name()
            .and_then(|d| d.to_str())
            .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
    if in_archive {
        return decode(name)
            .ok()
            .map(|id| item(ItemState::Published, Some(id)));
    }

    None
}

fn basename(name: &str) -> Result<String> {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CwallError::MalformedState(format!("{:?} has no basename", name)))
}

fn split_encoded(name: &str) -> Option<(&str, &str)> {
    let stem = name.strip_suffix(&format!(".{}", NORMALIZED_EXTENSION))?;
    let (base, id) = stem.split_once(DELIMITER)?;
    if !base.starts_with(RAW_PREFIX) || validate_remote_id(id).is_err() {
        return None;
    }
    Some((base, id))
}

fn validate_remote_id(id: &str) -> std::result::Result<(), &'static str> {
    if id.is_empty() {
        return Err("empty");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("only ASCII letters, digits, '-' and '_' are allowed");
    }
    Ok(())
}
