//! Offline preview of what the next sync would touch.
//!
//! Compares a scan with the persisted state only; the remote side is never
//! consulted, so a record deleted remotely still shows up as unchanged here.

use std::collections::HashSet;

use crate::contract::Record;
use crate::mapping::SyncState;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Keys with no remote id yet.
    pub new: Vec<String>,
    /// Mapped keys whose fingerprint differs from the last run.
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Mapped keys whose file is gone; these would be archived.
    pub removed: Vec<String>,
}

pub fn plan(records: &[Record], state: &SyncState) -> SyncPlan {
    let mut plan = SyncPlan::default();
    for record in records {
        match state.entry(&record.key) {
            None => plan.new.push(record.key.clone()),
            Some(entry) if entry.fingerprint.as_ref() == Some(&record.fingerprint) => {
                plan.unchanged.push(record.key.clone())
            }
            Some(_) => plan.changed.push(record.key.clone()),
        }
    }
    let current: HashSet<&str> = records.iter().map(|r| r.key.as_str()).collect();
    plan.removed = state
        .keys()
        .into_iter()
        .filter(|k| !current.contains(k.as_str()))
        .collect();
    plan
}
