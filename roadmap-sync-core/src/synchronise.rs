//! Reconciliation: mirrors a scanned feature tree into the remote board.
//!
//! A run is logically sequential:
//!   1. resolve the project group (persisted id, then name search, then create)
//!   2. decide skip / update / create for every record, a bounded number at a time
//!   3. archive records whose local file vanished since the previous run
//!   4. stamp the state; persisting it is left to the caller
//!
//! # Error Handling
//! Only group resolution is fatal. A failing record is reported in
//! [`SyncReport::failures`] and keeps its previous mapping entry; archive
//! failures are logged and swallowed.
//!
//! The unchanged fast path does not check that the remote record's project
//! relation still points at the current group; an out-of-band change there is
//! neither detected nor repaired.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{Record, RecordStore, RemoteError, RemoteId};
use crate::mapping::{SyncEntry, SyncState};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to resolve project group {name:?}: {source}")]
    Group {
        name: String,
        #[source]
        source: RemoteError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub key: String,
    pub title: String,
    pub remote_id: RemoteId,
    pub action: SyncAction,
}

#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub key: String,
    pub title: String,
    pub error: String,
}

#[derive(Debug)]
pub struct SyncReport {
    pub group_id: RemoteId,
    pub outcomes: Vec<RecordOutcome>,
    /// Keys whose mapping entry was dropped because the file is gone.
    pub archived: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

impl SyncReport {
    fn count(&self, action: SyncAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    pub fn created(&self) -> usize {
        self.count(SyncAction::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(SyncAction::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(SyncAction::Unchanged)
    }

    pub fn errors(&self) -> usize {
        self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "created={} updated={} unchanged={} archived={} errors={}",
            self.created(),
            self.updated(),
            self.unchanged(),
            self.archived.len(),
            self.errors()
        )
    }
}

pub async fn synchronise<S>(
    config: &SyncConfig,
    store: &S,
    records: &[Record],
    state: &mut SyncState,
) -> Result<SyncReport, SyncError>
where
    S: RecordStore + ?Sized,
{
    info!(
        project = %config.project_name,
        records = records.len(),
        "[SYNC] Starting reconciliation"
    );
    let prior_keys = state.keys();

    let group_id = resolve_group(store, &config.project_name, state.group_remote_id.as_ref())
        .await
        .map_err(|source| {
            error!(project = %config.project_name, error = %source, "[SYNC][ERROR] Group resolution failed");
            SyncError::Group {
                name: config.project_name.clone(),
                source,
            }
        })?;
    state.group_remote_id = Some(group_id.clone());
    info!(group_id = %group_id, "[SYNC] Project group resolved");

    let jobs: Vec<(usize, &Record, Option<SyncEntry>)> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (i, record, state.entry(&record.key)))
        .collect();

    let mut results: Vec<(usize, Result<(RemoteId, SyncAction), RemoteError>)> =
        stream::iter(jobs)
            .map(|(i, record, entry)| {
                let group_id = &group_id;
                async move { (i, sync_record(store, group_id, record, entry).await) }
            })
            .buffer_unordered(config.concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(i, _)| *i);

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for (i, result) in results {
        let record = &records[i];
        match result {
            Ok((remote_id, action)) => {
                state.set(&record.key, remote_id.clone(), record.fingerprint.clone());
                outcomes.push(RecordOutcome {
                    key: record.key.clone(),
                    title: record.title().to_string(),
                    remote_id,
                    action,
                });
            }
            Err(e) => {
                error!(key = %record.key, title = %record.title(), error = %e, "[SYNC][ERROR] Record sync failed");
                failures.push(RecordFailure {
                    key: record.key.clone(),
                    title: record.title().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let current: HashSet<&str> = records.iter().map(|r| r.key.as_str()).collect();
    let mut archived = Vec::new();
    for key in prior_keys.iter().filter(|k| !current.contains(k.as_str())) {
        if let Some(remote_id) = state.remove(key) {
            match store.archive_record(&remote_id).await {
                Ok(()) => info!(key = %key, remote_id = %remote_id, "[SYNC] Archived removed feature"),
                Err(e) => {
                    warn!(key = %key, remote_id = %remote_id, error = %e, "[SYNC] Archive failed, dropping mapping entry anyway")
                }
            }
        } else {
            debug!(key = %key, "[SYNC] Dropping fingerprint without remote id");
        }
        archived.push(key.clone());
    }

    state.last_sync_timestamp = Some(Utc::now());

    let report = SyncReport {
        group_id,
        outcomes,
        archived,
        failures,
    };
    info!(summary = %report.summary(), "[SYNC] Reconciliation complete");
    Ok(report)
}

async fn resolve_group<S>(
    store: &S,
    name: &str,
    persisted: Option<&RemoteId>,
) -> Result<RemoteId, RemoteError>
where
    S: RecordStore + ?Sized,
{
    if let Some(id) = persisted {
        match store.update_group(id, name).await {
            Ok(()) => {
                debug!(group_id = %id, "Persisted group id confirmed");
                return Ok(id.clone());
            }
            Err(e) if e.is_not_found() => {
                warn!(group_id = %id, "Persisted group id is stale, searching by name");
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(id) = store.find_group_by_name(name).await? {
        info!(group_id = %id, name, "Found existing group by name");
        return Ok(id);
    }
    let id = store.create_group(name).await?;
    info!(group_id = %id, name, "Created project group");
    Ok(id)
}

async fn sync_record<S>(
    store: &S,
    group_id: &RemoteId,
    record: &Record,
    entry: Option<SyncEntry>,
) -> Result<(RemoteId, SyncAction), RemoteError>
where
    S: RecordStore + ?Sized,
{
    let mut known = entry.as_ref().map(|e| e.remote_id.clone());

    if let Some(entry) = &entry {
        if entry.fingerprint.as_ref() == Some(&record.fingerprint) {
            match store.get_record(&entry.remote_id).await {
                Ok(true) => {
                    debug!(key = %record.key, "Unchanged, remote record confirmed");
                    return Ok((entry.remote_id.clone(), SyncAction::Unchanged));
                }
                Ok(false) | Err(RemoteError::NotFound) => {
                    warn!(key = %record.key, remote_id = %entry.remote_id, "Remote record is gone, resyncing");
                    known = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    if let Some(id) = known {
        match store
            .update_record(&id, group_id, &record.fields, &record.body)
            .await
        {
            Ok(()) => {
                info!(key = %record.key, remote_id = %id, "Updated feature");
                return Ok((id, SyncAction::Updated));
            }
            Err(e) if e.is_not_found() => {
                warn!(key = %record.key, remote_id = %id, "Persisted record id is stale, searching by title");
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(id) = store
        .find_record_by_title_and_group(record.title(), group_id)
        .await?
    {
        store
            .update_record(&id, group_id, &record.fields, &record.body)
            .await?;
        info!(key = %record.key, remote_id = %id, "Updated feature found by title");
        return Ok((id, SyncAction::Updated));
    }

    let id = store
        .create_record(group_id, &record.fields, &record.body)
        .await?;
    info!(key = %record.key, remote_id = %id, "Created feature");
    Ok((id, SyncAction::Created))
}
