use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::contract::Status;

pub const DEFAULT_EXTENSION: &str = "md";
pub const DEFAULT_CONCURRENCY: usize = 3;

/// What to scan and how to classify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Files whose name starts with one of these are skipped (templates, drafts).
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    /// Extra folder-name -> status entries, merged over the built-in table.
    #[serde(default)]
    pub status_folders: HashMap<String, Status>,
}

impl ScanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: default_extension(),
            excluded_prefixes: default_excluded_prefixes(),
            status_folders: HashMap::new(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            root = %self.root.display(),
            extension = %self.extension,
            status_overrides = self.status_folders.len(),
            "Loaded ScanConfig"
        );
        debug!(?self, "ScanConfig loaded (full debug)");
    }
}

/// Settings for one reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Display name of the project group on the board.
    pub project_name: String,
    /// Upper bound on records processed at the same time.
    pub concurrency: usize,
}

impl SyncConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["_".to_string()]
}
