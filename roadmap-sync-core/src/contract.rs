//! # contract: data model and the remote record capability
//!
//! This module defines the records produced by a scan and the single trait
//! ([`RecordStore`]) through which the reconciler talks to the hosted board.
//!
//! ## Interface & Extensibility
//! - Implement [`RecordStore`] to mirror into a new backend. The CLI crate
//!   ships the Notion implementation.
//! - All methods are async and return [`RemoteError`]; implementors must map a
//!   stale or unknown id to [`RemoteError::NotFound`] so the reconciler can fall
//!   back to search or create.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockRecordStore` is exported under
//!   `test` and the `test-export-mocks` feature.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::fingerprint::Fingerprint;

/// Opaque identifier of a remote record (a Notion page id, for instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        RemoteId(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId(s.to_string())
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kanban column a feature belongs to, derived from its containing folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Backlog,
    Planned,
    InProgress,
    Completed,
}

impl Status {
    /// Display label used on the board.
    pub fn label(self) -> &'static str {
        match self {
            Status::Backlog => "Backlog",
            Status::Planned => "Planned",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
        }
    }

    /// Position in scan output: active work first, finished work last.
    pub fn rank(self) -> u8 {
        match self {
            Status::InProgress => 0,
            Status::Planned => 1,
            Status::Backlog => 2,
            Status::Completed => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One checklist item of a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub text: String,
    pub completed: bool,
    /// Heading the item was listed under, e.g. "Phase 1: Parser".
    pub phase: Option<String>,
}

/// Free-form content of a feature, rendered into the remote record's body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBody {
    pub description: Option<String>,
    pub subtasks: Vec<Subtask>,
}

/// Properties patched onto the remote record.
///
/// `None` attributes are left untouched remotely, never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub title: String,
    pub status: Status,
    pub priority: Option<String>,
    pub complexity: Option<String>,
}

/// A locally authored feature file, ready to be mirrored.
#[derive(Debug, Clone)]
pub struct Record {
    /// Path relative to the scan root with status folders removed.
    pub key: String,
    pub path: PathBuf,
    pub fields: RecordFields,
    pub body: RecordBody,
    pub fingerprint: Fingerprint,
}

impl Record {
    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn status(&self) -> Status {
        self.fields.status
    }
}

/// Errors surfaced by a [`RecordStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote record not found")]
    NotFound,

    #[error("rate limited by remote API")]
    RateLimited,

    #[error("remote API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound)
    }
}

/// Trait for finding and mutating groups (projects) and records (features)
/// in the two remote collections.
///
/// The trait is `Send` + `Sync` and intended for async/await usage; records
/// may be processed concurrently against one store.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Search the groups collection for an exact name match.
    async fn find_group_by_name(&self, name: &str) -> Result<Option<RemoteId>, RemoteError>;

    async fn create_group(&self, name: &str) -> Result<RemoteId, RemoteError>;

    /// Patch the group's display name. Fails with `NotFound` if `id` is stale.
    async fn update_group(&self, id: &RemoteId, name: &str) -> Result<(), RemoteError>;

    /// Fallback lookup used when no persisted id is known for a record.
    async fn find_record_by_title_and_group(
        &self,
        title: &str,
        group_id: &RemoteId,
    ) -> Result<Option<RemoteId>, RemoteError>;

    /// Whether the record still exists and is not archived.
    async fn get_record(&self, id: &RemoteId) -> Result<bool, RemoteError>;

    async fn create_record(
        &self,
        group_id: &RemoteId,
        fields: &RecordFields,
        body: &RecordBody,
    ) -> Result<RemoteId, RemoteError>;

    /// Patch properties in place and replace the body wholesale.
    /// Fails with `NotFound` if `id` is stale.
    async fn update_record(
        &self,
        id: &RemoteId,
        group_id: &RemoteId,
        fields: &RecordFields,
        body: &RecordBody,
    ) -> Result<(), RemoteError>;

    /// Soft-delete a record. Already archived or missing ids succeed.
    async fn archive_record(&self, id: &RemoteId) -> Result<(), RemoteError>;
}
