//! Persisted correlation between local feature keys and remote record ids.
//!
//! The mapping file is pretty-printed JSON so it can be inspected and edited by
//! hand; deleting one entry from both tables forces that feature to resync.
//! Loading never fails: a missing or corrupt file yields an empty state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::contract::RemoteId;
use crate::fingerprint::Fingerprint;

/// Default file name, placed in the project directory.
pub const DEFAULT_MAPPING_FILE: &str = ".roadmap-sync.json";

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize sync state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MappingError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        MappingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Remote id and last synced fingerprint of one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub remote_id: RemoteId,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub group_remote_id: Option<RemoteId>,
    #[serde(default)]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remote_ids: BTreeMap<String, RemoteId>,
    #[serde(default)]
    pub fingerprints: BTreeMap<String, Fingerprint>,
}

impl SyncState {
    /// A key only counts as mapped when it has a remote id.
    pub fn entry(&self, key: &str) -> Option<SyncEntry> {
        self.remote_ids.get(key).map(|id| SyncEntry {
            remote_id: id.clone(),
            fingerprint: self.fingerprints.get(key).cloned(),
        })
    }

    pub fn set(&mut self, key: &str, remote_id: RemoteId, fingerprint: Fingerprint) {
        self.remote_ids.insert(key.to_string(), remote_id);
        self.fingerprints.insert(key.to_string(), fingerprint);
    }

    pub fn remove(&mut self, key: &str) -> Option<RemoteId> {
        self.fingerprints.remove(key);
        self.remote_ids.remove(key)
    }

    /// Every key present in either table.
    pub fn keys(&self) -> BTreeSet<String> {
        self.remote_ids
            .keys()
            .chain(self.fingerprints.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.remote_ids.is_empty() && self.fingerprints.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> SyncState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No mapping file yet, starting from empty state");
                return SyncState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read mapping file, starting from empty state");
                return SyncState::default();
            }
        };
        match serde_json::from_str::<SyncState>(&content) {
            Ok(state) => {
                debug!(
                    path = %self.path.display(),
                    entries = state.remote_ids.len(),
                    "Loaded mapping file"
                );
                state
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Mapping file is malformed, starting from empty state");
                SyncState::default()
            }
        }
    }

    /// Overwrite the mapping file with `state`. Written to a temp file in the
    /// same directory and renamed into place.
    pub fn save(&self, state: &SyncState) -> Result<(), MappingError> {
        let json = serde_json::to_string_pretty(state)?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| MappingError::io(&parent, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|e| MappingError::io(&parent, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| MappingError::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| MappingError::io(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            entries = state.remote_ids.len(),
            "Saved mapping file"
        );
        Ok(())
    }
}
