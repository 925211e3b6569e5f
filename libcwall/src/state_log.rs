//! Append-only record of item state transitions
//!
//! Every move the stages make on disk is mirrored here as one JSON line, so
//! the history of an item (when it was uploaded, which remote id it got,
//! how often publishing failed) survives even though the filename only
//! shows its current state. The directory layout remains the source of
//! truth for what the next run picks up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::types::ItemState;

pub const STATE_LOG_FILE: &str = ".cwall-state.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRecord {
    /// Item identity: the quarantined basename, e.g. `IMG001`, or
    /// `IMG001.1` for a capture that reused an earlier name
    pub item: String,
    pub state: ItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// File location after the transition, relative to the watch directory
    pub file: String,
    pub at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(item: impl Into<String>, state: ItemState, file: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            state,
            remote_id: None,
            file: file.into(),
            at: Utc::now(),
        }
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

pub struct StateLog {
    path: PathBuf,
}

impl StateLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The log that belongs to a watch directory
    pub fn for_watch_dir(watch_dir: &Path) -> Self {
        Self::new(watch_dir.join(STATE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &StateRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Append, logging instead of failing; bookkeeping never stops a stage
    pub fn record(&self, record: StateRecord) {
        if let Err(e) = self.append(&record) {
            warn!(
                "Failed to record {} -> {} in {}: {}",
                record.item,
                record.state,
                self.path.display(),
                e
            );
        }
    }

    /// All records in append order. Lines that do not parse (for example a
    /// line cut short by a crash) are skipped.
    pub fn records(&self) -> Result<Vec<StateRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping unreadable line {} of {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Replay the log: the most recent record per item
    pub fn latest(&self) -> Result<BTreeMap<String, StateRecord>> {
        let mut latest = BTreeMap::new();
        for record in self.records()? {
            latest.insert(record.item.clone(), record);
        }
        Ok(latest)
    }

    /// Which item each remote object id was recorded for
    pub fn items_by_remote_id(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .records()?
            .into_iter()
            .filter_map(|record| record.remote_id.map(|id| (id, record.item)))
            .collect())
    }

    /// Items whose most recent state is `state`
    pub fn in_state(&self, state: ItemState) -> Result<Vec<StateRecord>> {
        Ok(self
            .latest()?
            .into_values()
            .filter(|record| record.state == state)
            .collect())
    }
}
