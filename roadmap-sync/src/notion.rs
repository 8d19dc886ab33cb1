#![doc = "Notion implementation of the remote record capability used by the CLI."]
//
//! # Notion client
//!
//! Bridges the core [`RecordStore`] trait to the Notion REST API. Projects live
//! in one database (title property `Name`), features in another with `Name`,
//! `Status`, `Project` (relation), `Priority` and `Complexity` properties.
//!
//! - Construct [`NotionClient`] from [`Credentials`] (see `load_config`).
//! - HTTP 404, and edits rejected because a page is archived, map to
//!   [`RemoteError::NotFound`] so the reconciler can fall back.
//! - 429 responses are retried a few times, honouring `Retry-After`.
//! - Updating a feature patches properties in place, then deletes every child
//!   block and appends the freshly rendered ones.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use roadmap_sync_core::contract::{RecordBody, RecordFields, RecordStore, RemoteError, RemoteId};

use crate::load_config::Credentials;
use crate::render::{body_blocks, record_properties, title_property, PROP_NAME, PROP_PROJECT};

pub const NOTION_API_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const MAX_ATTEMPTS: u32 = 3;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(30);
const MAX_BLOCKS_PER_REQUEST: usize = 100;
const DELETE_CONCURRENCY: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    projects_database_id: String,
    features_database_id: String,
}

impl NotionClient {
    pub fn new(credentials: &Credentials) -> Result<Self, RemoteError> {
        Self::with_base_url(credentials, NOTION_API_URL)
    }

    pub fn with_base_url(
        credentials: &Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let base_url = base_url.into();
        info!(base_url = %base_url, "Initialized NotionClient");
        Ok(Self {
            http,
            base_url,
            token: credentials.token.clone(),
            projects_database_id: credentials.projects_database_id.clone(),
            features_database_id: credentials.features_database_id.clone(),
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header("Notion-Version", NOTION_VERSION);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| {
                error!(error = ?e, method = %method, url = %url, "Notion request failed");
                RemoteError::Transport(e.to_string())
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                let wait = retry_wait(retry_after, attempt);
                warn!(url = %url, attempt, wait_secs = wait.as_secs(), "Rate limited by Notion, retrying");
                tokio::time::sleep(wait).await;
                continue;
            }
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| RemoteError::Decode(e.to_string()));
            }
            let text = response.text().await.unwrap_or_default();
            let err = error_for_status(status, &text);
            debug!(status = %status, url = %url, error = %err, "Notion returned an error");
            return Err(err);
        }
    }

    async fn query_first(
        &self,
        database_id: &str,
        filter: Value,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let body = json!({ "filter": filter, "page_size": 1 });
        let response = self
            .call(
                Method::POST,
                &format!("databases/{database_id}/query"),
                Some(&body),
            )
            .await?;
        Ok(response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|page| page.get("id"))
            .and_then(Value::as_str)
            .map(RemoteId::from))
    }

    async fn list_children(&self, block_id: &RemoteId) -> Result<Vec<String>, RemoteError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("blocks/{block_id}/children?page_size=100");
            if let Some(c) = &cursor {
                path.push_str(&format!("&start_cursor={c}"));
            }
            let response = self.call(Method::GET, &path, None).await?;
            if let Some(results) = response.get("results").and_then(Value::as_array) {
                ids.extend(
                    results
                        .iter()
                        .filter_map(|b| b.get("id").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
            let has_more = response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }
        Ok(ids)
    }

    async fn append_children(&self, block_id: &RemoteId, blocks: &[Value]) -> Result<(), RemoteError> {
        for chunk in blocks.chunks(MAX_BLOCKS_PER_REQUEST) {
            let body = json!({ "children": chunk });
            self.call(
                Method::PATCH,
                &format!("blocks/{block_id}/children"),
                Some(&body),
            )
            .await?;
        }
        Ok(())
    }

    /// Delete every existing child block, then append `blocks`.
    async fn replace_children(&self, page_id: &RemoteId, blocks: &[Value]) -> Result<(), RemoteError> {
        let existing = self.list_children(page_id).await?;
        debug!(page_id = %page_id, existing = existing.len(), "Clearing page body");
        let deletions: Vec<Result<(), RemoteError>> = stream::iter(existing)
            .map(|child| async move {
                match self
                    .call(Method::DELETE, &format!("blocks/{child}"), None)
                    .await
                {
                    Ok(_) | Err(RemoteError::NotFound) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;
        deletions.into_iter().collect::<Result<Vec<()>, RemoteError>>()?;
        self.append_children(page_id, blocks).await
    }
}

/// Delay before retrying a rate-limited request, capped at [`MAX_RETRY_WAIT`].
fn retry_wait(retry_after: Option<&str>, attempt: u32) -> Duration {
    retry_after
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(u64::from(attempt)))
        .min(MAX_RETRY_WAIT)
}

/// Map a non-success response to a [`RemoteError`], pulling Notion's
/// `message` field out of the body when present.
pub fn error_for_status(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::BAD_REQUEST if message.to_lowercase().contains("archived") => {
            RemoteError::NotFound
        }
        _ => RemoteError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

fn response_id(value: &Value) -> Result<RemoteId, RemoteError> {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(RemoteId::from)
        .ok_or_else(|| RemoteError::Decode("response has no id".to_string()))
}

/// A page counts as existing when it is neither archived nor in the trash.
pub fn page_is_live(page: &Value) -> bool {
    let flag = |name: &str| page.get(name).and_then(Value::as_bool).unwrap_or(false);
    !flag("archived") && !flag("in_trash")
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn find_group_by_name(&self, name: &str) -> Result<Option<RemoteId>, RemoteError> {
        info!(name, "Searching project by name");
        let filter = json!({ "property": PROP_NAME, "title": { "equals": name } });
        self.query_first(&self.projects_database_id, filter).await
    }

    async fn create_group(&self, name: &str) -> Result<RemoteId, RemoteError> {
        info!(name, "Creating project");
        let body = json!({
            "parent": { "database_id": self.projects_database_id },
            "properties": { PROP_NAME: title_property(name) }
        });
        let page = self.call(Method::POST, "pages", Some(&body)).await?;
        response_id(&page)
    }

    async fn update_group(&self, id: &RemoteId, name: &str) -> Result<(), RemoteError> {
        debug!(group_id = %id, name, "Patching project name");
        let body = json!({ "properties": { PROP_NAME: title_property(name) } });
        let page = self
            .call(Method::PATCH, &format!("pages/{id}"), Some(&body))
            .await?;
        if page_is_live(&page) {
            Ok(())
        } else {
            Err(RemoteError::NotFound)
        }
    }

    async fn find_record_by_title_and_group(
        &self,
        title: &str,
        group_id: &RemoteId,
    ) -> Result<Option<RemoteId>, RemoteError> {
        debug!(title, group_id = %group_id, "Searching feature by title");
        let filter = json!({
            "and": [
                { "property": PROP_NAME, "title": { "equals": title } },
                { "property": PROP_PROJECT, "relation": { "contains": group_id.as_str() } }
            ]
        });
        self.query_first(&self.features_database_id, filter).await
    }

    async fn get_record(&self, id: &RemoteId) -> Result<bool, RemoteError> {
        match self.call(Method::GET, &format!("pages/{id}"), None).await {
            Ok(page) => Ok(page_is_live(&page)),
            Err(RemoteError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_record(
        &self,
        group_id: &RemoteId,
        fields: &RecordFields,
        body: &RecordBody,
    ) -> Result<RemoteId, RemoteError> {
        info!(title = %fields.title, status = %fields.status, "Creating feature page");
        let blocks = body_blocks(body);
        let (first, rest) = blocks.split_at(blocks.len().min(MAX_BLOCKS_PER_REQUEST));
        let request = json!({
            "parent": { "database_id": self.features_database_id },
            "properties": record_properties(group_id, fields),
            "children": first
        });
        let page = self.call(Method::POST, "pages", Some(&request)).await?;
        let id = response_id(&page)?;
        if !rest.is_empty() {
            self.append_children(&id, rest).await?;
        }
        Ok(id)
    }

    async fn update_record(
        &self,
        id: &RemoteId,
        group_id: &RemoteId,
        fields: &RecordFields,
        body: &RecordBody,
    ) -> Result<(), RemoteError> {
        info!(page_id = %id, title = %fields.title, status = %fields.status, "Updating feature page");
        let request = json!({ "properties": record_properties(group_id, fields) });
        let page = self
            .call(Method::PATCH, &format!("pages/{id}"), Some(&request))
            .await?;
        if !page_is_live(&page) {
            return Err(RemoteError::NotFound);
        }
        self.replace_children(id, &body_blocks(body)).await
    }

    async fn archive_record(&self, id: &RemoteId) -> Result<(), RemoteError> {
        info!(page_id = %id, "Archiving feature page");
        let body = json!({ "archived": true });
        match self
            .call(Method::PATCH, &format!("pages/{id}"), Some(&body))
            .await
        {
            Ok(_) | Err(RemoteError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
