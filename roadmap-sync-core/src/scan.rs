//! Walks a feature tree and turns every syncable markdown file into a [`Record`].
//!
//! Scanning never fails as a whole: a missing root gives an empty result and
//! unreadable or untitled files are reported as [`ScanWarning`]s.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::contract::{Record, RecordFields, Status};
use crate::extract::extract;
use crate::fingerprint::fingerprint_parts;

const DEFAULT_STATUS_FOLDERS: &[(&str, Status)] = &[
    ("backlog", Status::Backlog),
    ("todo", Status::Backlog),
    ("planned", Status::Planned),
    ("next", Status::Planned),
    ("in-progress", Status::InProgress),
    ("inprogress", Status::InProgress),
    ("doing", Status::InProgress),
    ("active", Status::InProgress),
    ("completed", Status::Completed),
    ("done", Status::Completed),
];

/// A file that was left out of the scan, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ScanOutput {
    pub records: Vec<Record>,
    pub warnings: Vec<ScanWarning>,
}

/// Folder name -> status lookup with `Backlog` as the default.
#[derive(Debug, Clone)]
pub struct StatusTable {
    folders: HashMap<String, Status>,
}

impl StatusTable {
    pub fn from_config(config: &ScanConfig) -> Self {
        let mut folders: HashMap<String, Status> = DEFAULT_STATUS_FOLDERS
            .iter()
            .map(|(name, status)| (name.to_string(), *status))
            .collect();
        for (name, status) in &config.status_folders {
            folders.insert(normalize_folder(name), *status);
        }
        Self { folders }
    }

    pub fn lookup(&self, folder: &str) -> Option<Status> {
        self.folders.get(&normalize_folder(folder)).copied()
    }

    /// Status of a root-relative file path, taken from its nearest
    /// recognised ancestor folder.
    pub fn classify(&self, relative: &Path) -> Status {
        let parent = relative.parent().unwrap_or(Path::new(""));
        parent
            .components()
            .rev()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .find_map(|name| self.lookup(name))
            .unwrap_or(Status::Backlog)
    }

    /// Stable key for a root-relative path: status folders are dropped so
    /// moving a file between columns keeps its identity.
    pub fn key_for(&self, relative: &Path) -> String {
        let mut segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let file_name = segments.pop().unwrap_or_default();
        segments.retain(|dir| self.lookup(dir).is_none());
        segments.push(file_name);
        segments.join("/")
    }
}

/// Lowercase and unify separators so `In Progress`, `in_progress` and
/// `in-progress` hit the same entry.
pub fn normalize_folder(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect()
}

pub fn scan(config: &ScanConfig) -> ScanOutput {
    let root = &config.root;
    let mut output = ScanOutput::default();
    if !root.is_dir() {
        warn!(root = %root.display(), "Feature root does not exist, nothing to scan");
        return output;
    }
    info!(root = %root.display(), "Scanning feature tree");

    let table = StatusTable::from_config(config);
    let mut files = Vec::new();
    collect_files(config, root, &mut files, &mut output.warnings);

    let mut records = Vec::new();
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        match read_record(&table, &path, &relative) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {
                warn!(path = %path.display(), "Feature file has no title, skipping");
                output.warnings.push(ScanWarning {
                    path,
                    message: "no title found".to_string(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read feature file, skipping");
                output.warnings.push(ScanWarning {
                    path,
                    message: format!("unreadable: {e}"),
                });
            }
        }
    }

    records.sort_by(|a, b| {
        a.status()
            .rank()
            .cmp(&b.status().rank())
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut seen = HashSet::new();
    for record in records {
        if seen.insert(record.key.clone()) {
            output.records.push(record);
        } else {
            warn!(key = %record.key, path = %record.path.display(), "Duplicate feature key, skipping");
            output.warnings.push(ScanWarning {
                path: record.path,
                message: format!("duplicate key {}", record.key),
            });
        }
    }

    info!(
        records = output.records.len(),
        warnings = output.warnings.len(),
        "Scan complete"
    );
    output
}

fn collect_files(
    config: &ScanConfig,
    dir: &Path,
    files: &mut Vec<PathBuf>,
    warnings: &mut Vec<ScanWarning>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read directory, skipping");
            warnings.push(ScanWarning {
                path: dir.to_path_buf(),
                message: format!("unreadable directory: {e}"),
            });
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Skipping symlinked directory");
            continue;
        }
        if file_type.is_dir() {
            if name.starts_with('.') {
                debug!(path = %path.display(), "Skipping hidden directory");
                continue;
            }
            collect_files(config, &path, files, warnings);
        } else if is_feature_file(config, &path, &name) {
            files.push(path);
        }
    }
}

fn is_feature_file(config: &ScanConfig, path: &Path, name: &str) -> bool {
    let extension_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(&config.extension));
    if !extension_matches {
        return false;
    }
    if name.eq_ignore_ascii_case("readme.md") {
        return false;
    }
    !config
        .excluded_prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
}

fn read_record(
    table: &StatusTable,
    path: &Path,
    relative: &Path,
) -> std::io::Result<Option<Record>> {
    let raw = fs::read(path)?;
    let source = String::from_utf8_lossy(&raw);
    let extracted = extract(&source);
    let Some(title) = extracted.title else {
        return Ok(None);
    };
    let status = table.classify(relative);
    let record = Record {
        key: table.key_for(relative),
        path: path.to_path_buf(),
        fields: RecordFields {
            title,
            status,
            priority: extracted.priority,
            complexity: extracted.complexity,
        },
        body: extracted.body,
        fingerprint: fingerprint_parts(&[status.label().as_bytes(), raw.as_slice()]),
    };
    debug!(key = %record.key, status = %status, fingerprint = %record.fingerprint, "Scanned feature");
    Ok(Some(record))
}
