//! Notion wire format for feature properties and body blocks.

use roadmap_sync_core::contract::{RecordBody, RecordFields, RemoteId};
use serde_json::{json, Map, Value};

pub const PROP_NAME: &str = "Name";
pub const PROP_STATUS: &str = "Status";
pub const PROP_PROJECT: &str = "Project";
pub const PROP_PRIORITY: &str = "Priority";
pub const PROP_COMPLEXITY: &str = "Complexity";

/// Notion rejects rich text objects longer than this.
const MAX_TEXT_LEN: usize = 2000;

pub fn rich_text(content: &str) -> Value {
    let chunks: Vec<Value> = split_text(content)
        .into_iter()
        .map(|chunk| json!({ "type": "text", "text": { "content": chunk } }))
        .collect();
    Value::Array(chunks)
}

pub fn title_property(name: &str) -> Value {
    json!({ "title": rich_text(name) })
}

/// Properties for a feature page. Absent attributes are left out entirely so
/// a PATCH never clears them.
pub fn record_properties(group_id: &RemoteId, fields: &RecordFields) -> Value {
    let mut props = Map::new();
    props.insert(PROP_NAME.into(), title_property(&fields.title));
    props.insert(
        PROP_STATUS.into(),
        json!({ "select": { "name": fields.status.label() } }),
    );
    props.insert(
        PROP_PROJECT.into(),
        json!({ "relation": [{ "id": group_id.as_str() }] }),
    );
    if let Some(priority) = &fields.priority {
        props.insert(PROP_PRIORITY.into(), json!({ "select": { "name": priority } }));
    }
    if let Some(complexity) = &fields.complexity {
        props.insert(
            PROP_COMPLEXITY.into(),
            json!({ "select": { "name": complexity } }),
        );
    }
    Value::Object(props)
}

/// Description paragraph, then subtasks as to-dos with a heading whenever the
/// phase changes.
pub fn body_blocks(body: &RecordBody) -> Vec<Value> {
    let mut blocks = Vec::new();
    if let Some(description) = &body.description {
        blocks.push(json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text(description) }
        }));
    }
    let mut current_phase: Option<&str> = None;
    for task in &body.subtasks {
        let phase = task.phase.as_deref();
        if phase != current_phase {
            if let Some(label) = phase {
                blocks.push(json!({
                    "object": "block",
                    "type": "heading_3",
                    "heading_3": { "rich_text": rich_text(label) }
                }));
            }
            current_phase = phase;
        }
        blocks.push(json!({
            "object": "block",
            "type": "to_do",
            "to_do": { "rich_text": rich_text(&task.text), "checked": task.completed }
        }));
    }
    blocks
}

fn split_text(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(MAX_TEXT_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
