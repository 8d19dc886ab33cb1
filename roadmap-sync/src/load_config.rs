/// `load_config` module: turns the optional YAML file, CLI flags and environment
/// secrets into the explicit configuration structs the core expects.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file (no secrets) into [`CliConfig`]
/// - Resolve relative paths against the config file's directory
/// - Read the Notion token and database ids from the environment, failing
///   with a [`ConfigError`] that names the missing variable
///
/// Nothing here touches the network; every error is raised before the first
/// remote call.
use roadmap_sync_core::config::{ScanConfig, SyncConfig, DEFAULT_CONCURRENCY};
use roadmap_sync_core::contract::Status;
use roadmap_sync_core::mapping::DEFAULT_MAPPING_FILE;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_TOKEN: &str = "NOTION_TOKEN";
pub const ENV_PROJECTS_DATABASE: &str = "NOTION_PROJECTS_DATABASE_ID";
pub const ENV_FEATURES_DATABASE: &str = "NOTION_FEATURES_DATABASE_ID";

/// Picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "roadmap-sync.yaml";
pub const DEFAULT_ROOT: &str = "roadmap";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

/// YAML schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub project: Option<String>,
    pub mapping_file: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub extension: Option<String>,
    pub excluded_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub status_folders: HashMap<String, Status>,
}

/// Flags that win over the YAML file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub project: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub scan: ScanConfig,
    pub sync: SyncConfig,
    pub mapping_file: PathBuf,
}

/// Notion credentials, only ever read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub projects_database_id: String,
    pub features_database_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("projects_database_id", &self.projects_database_id)
            .field("features_database_id", &self.features_database_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = required_env(ENV_TOKEN)?;
        let projects_database_id = required_env(ENV_PROJECTS_DATABASE)?;
        let features_database_id = required_env(ENV_FEATURES_DATABASE)?;
        info!(
            token_set = !token.is_empty(),
            projects_database_id = %projects_database_id,
            features_database_id = %features_database_id,
            "Loaded Notion credentials from environment"
        );
        Ok(Self {
            token,
            projects_database_id,
            features_database_id,
        })
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => {
            error!(variable = name, "Required environment variable is missing");
            Err(ConfigError::MissingEnv(name))
        }
    }
}

/// Load configuration. `path` is explicit `--config`; when absent,
/// `roadmap-sync.yaml` in the working directory is used if it exists.
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<CliConfig, ConfigError> {
    let cwd = env::current_dir().map_err(ConfigError::WorkingDir)?;
    let implicit = cwd.join(DEFAULT_CONFIG_FILE);
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None if implicit.is_file() => Some(implicit),
        None => None,
    };

    let (file, base_dir) = match &config_path {
        Some(p) => {
            let file = read_file_config(p)?;
            let base = match p.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
                _ => cwd.clone(),
            };
            (file, base)
        }
        None => (FileConfig::default(), cwd.clone()),
    };

    let root = overrides
        .root
        .map(|r| cwd.join(r))
        .or_else(|| file.root.map(|r| base_dir.join(r)))
        .unwrap_or_else(|| base_dir.join(DEFAULT_ROOT));
    let project_name = overrides
        .project
        .or(file.project)
        .unwrap_or_else(|| directory_name(&base_dir));
    let mapping_file = file
        .mapping_file
        .map(|m| base_dir.join(m))
        .unwrap_or_else(|| base_dir.join(DEFAULT_MAPPING_FILE));

    let mut scan = ScanConfig::new(root);
    if let Some(extension) = file.extension {
        scan.extension = extension.trim_start_matches('.').to_string();
    }
    if let Some(prefixes) = file.excluded_prefixes {
        scan.excluded_prefixes = prefixes;
    }
    scan.status_folders = file.status_folders;
    scan.trace_loaded();

    let mut sync = SyncConfig::new(project_name);
    sync.concurrency = file.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);

    info!(
        project = %sync.project_name,
        mapping_file = %mapping_file.display(),
        concurrency = sync.concurrency,
        "Configuration resolved"
    );
    Ok(CliConfig {
        scan,
        sync,
        mapping_file,
    })
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|source| {
        error!(error = ?source, config_path = ?path, "Failed to read config file");
        ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;
    // an empty file parses to null; treat it as all defaults
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|source| {
        error!(error = ?source, config_path = ?path, "Failed to parse config YAML");
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn directory_name(dir: &Path) -> String {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_ROOT.to_string())
}
