///
/// This module implements the CLI interface for roadmap-sync: command parsing,
/// configuration and credential checks, and the user-visible summary.
///
/// All reconciliation logic (scanning, change detection, mapping state) lives in
/// the [`roadmap-sync-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `sync`: mirror the feature tree into Notion and persist the mapping file.
/// - `status`: offline preview of new / changed / unchanged / removed features.
///
/// For programmatic or integration use, call [`run`] with a constructed [`Cli`],
/// or [`sync_with_store`] with any [`RecordStore`] implementation.
///
/// [`roadmap-sync-core`]: ../../roadmap-sync-core/
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roadmap_sync_core::contract::RecordStore;
use roadmap_sync_core::mapping::MappingStore;
use roadmap_sync_core::plan::plan;
use roadmap_sync_core::scan::{scan, ScanOutput};
use roadmap_sync_core::synchronise::{synchronise, SyncReport};
use std::path::PathBuf;

use crate::load_config::{load_config, CliConfig, Credentials, Overrides};
use crate::notion::NotionClient;

/// CLI for roadmap-sync: mirror feature markdown files into a Notion board.
#[derive(Parser)]
#[clap(
    name = "roadmap-sync",
    version,
    about = "One-way sync of local feature markdown files into a Notion kanban board"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the feature tree into the Projects and Features databases
    Sync {
        /// Path to the YAML config file (defaults to ./roadmap-sync.yaml if present)
        #[clap(long)]
        config: Option<PathBuf>,
        /// Feature root directory, overriding the config file
        #[clap(long)]
        root: Option<PathBuf>,
        /// Project name shown on the board, overriding the config file
        #[clap(long)]
        project: Option<String>,
    },
    /// Show what the next sync would change, without contacting Notion
    Status {
        #[clap(long)]
        config: Option<PathBuf>,
        #[clap(long)]
        root: Option<PathBuf>,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            root,
            project,
        } => {
            let config = load_config(config.as_deref(), Overrides { root, project })?;
            // credentials are checked before any remote call is made
            let credentials = Credentials::from_env()?;
            let client = NotionClient::new(&credentials)?;
            tracing::info!(command = "sync", project = %config.sync.project_name, "Starting synchronisation");

            let report = sync_with_store(&config, &client).await?;
            println!("Synchronise complete: {}", report.summary());
            for failure in &report.failures {
                eprintln!("[ERROR] {} ({}): {}", failure.key, failure.title, failure.error);
            }
            if report.errors() > 0 {
                tracing::error!(command = "sync", errors = report.errors(), "Synchronisation finished with errors");
                bail!("{} feature(s) failed to sync", report.errors());
            }
            tracing::info!(command = "sync", summary = %report.summary(), "Synchronisation complete");
            Ok(())
        }
        Commands::Status { config, root } => {
            let config = load_config(
                config.as_deref(),
                Overrides {
                    root,
                    project: None,
                },
            )?;
            print_status(&config);
            Ok(())
        }
    }
}

/// Scan, reconcile against `store`, and persist the mapping file. State is
/// saved even when individual features failed; a failed group resolution
/// leaves the file untouched.
pub async fn sync_with_store<S>(config: &CliConfig, store: &S) -> Result<SyncReport>
where
    S: RecordStore + ?Sized,
{
    let scanned = scan(&config.scan);
    print_warnings(&scanned);

    let mapping = MappingStore::new(&config.mapping_file);
    let mut state = mapping.load();
    let report = synchronise(&config.sync, store, &scanned.records, &mut state)
        .await
        .context("Synchronisation failed")?;
    mapping
        .save(&state)
        .with_context(|| format!("Failed to save mapping file {}", config.mapping_file.display()))?;
    Ok(report)
}

fn print_warnings(scanned: &ScanOutput) {
    for warning in &scanned.warnings {
        eprintln!("[WARN] skipped {}: {}", warning.path.display(), warning.message);
    }
}

fn print_status(config: &CliConfig) {
    let scanned = scan(&config.scan);
    print_warnings(&scanned);
    let state = MappingStore::new(&config.mapping_file).load();
    let preview = plan(&scanned.records, &state);

    println!("Project:      {}", config.sync.project_name);
    println!("Feature root: {}", config.scan.root.display());
    println!("Mapping file: {}", config.mapping_file.display());
    match state.last_sync_timestamp {
        Some(ts) => println!("Last sync:    {}", ts.to_rfc3339()),
        None => println!("Last sync:    never"),
    }
    println!(
        "new={} changed={} unchanged={} removed={}",
        preview.new.len(),
        preview.changed.len(),
        preview.unchanged.len(),
        preview.removed.len()
    );
    for (label, keys) in [
        ("new", &preview.new),
        ("changed", &preview.changed),
        ("removed", &preview.removed),
    ] {
        for key in keys {
            println!("  {label:<8} {key}");
        }
    }
}
