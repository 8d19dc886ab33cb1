//! Field extraction from a single feature markdown file.
//!
//! Extraction is line based and forgiving: anything it does not recognise is
//! ignored. Only a missing title makes a file unsyncable, and that decision is
//! left to the scanner.

use regex::Regex;
use std::sync::LazyLock;

use crate::contract::{RecordBody, Subtask};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").unwrap());

static FEATURE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^feature(?:\s+[\w.\-]+)?\s*:\s*").unwrap());

static METADATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[-*]\s+)?\*{0,2}(title|priority|complexity|status)\*{0,2}\s*:\s*\*{0,2}\s*(.*?)\s*$")
        .unwrap()
});

static TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\[([ xX])\]\s+(.+?)\s*$").unwrap());

const DESCRIPTION_HEADINGS: &[&str] = &["description", "overview", "summary"];

/// Everything pulled out of one feature file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    pub priority: Option<String>,
    pub complexity: Option<String>,
    pub body: RecordBody,
}

pub fn extract(source: &str) -> Extracted {
    let mut heading_title: Option<String> = None;
    let mut metadata_title: Option<String> = None;
    let mut priority = None;
    let mut complexity = None;
    let mut subtasks = Vec::new();

    let mut phase: Option<String> = None;
    let mut in_description_section = false;
    let mut section_description: Vec<&str> = Vec::new();
    let mut first_paragraph: Vec<&str> = Vec::new();
    let mut first_paragraph_done = false;

    for line in source.lines() {
        let trimmed = line.trim();

        if let Some(caps) = HEADING.captures(trimmed) {
            let level = caps[1].len();
            let text = caps[2].trim().to_string();
            if !first_paragraph.is_empty() {
                first_paragraph_done = true;
            }
            in_description_section = level == 2
                && DESCRIPTION_HEADINGS
                    .iter()
                    .any(|h| text.eq_ignore_ascii_case(h));
            match level {
                1 => {
                    if heading_title.is_none() {
                        heading_title = clean_title(&text);
                    }
                    phase = None;
                }
                2 if text.to_ascii_lowercase().starts_with("phase") => phase = Some(text),
                2 => phase = None,
                _ => phase = Some(text),
            }
            continue;
        }

        if let Some(caps) = TASK.captures(line) {
            subtasks.push(Subtask {
                text: caps[2].to_string(),
                completed: !caps[1].trim().is_empty(),
                phase: phase.clone(),
            });
            if !first_paragraph.is_empty() {
                first_paragraph_done = true;
            }
            continue;
        }

        if let Some(caps) = METADATA.captures(trimmed) {
            let value = clean_value(&caps[2]);
            match caps[1].to_ascii_lowercase().as_str() {
                "title" if metadata_title.is_none() => metadata_title = value,
                "priority" if priority.is_none() => priority = value,
                "complexity" if complexity.is_none() => complexity = value,
                _ => {}
            }
            continue;
        }

        if trimmed.is_empty() {
            if !first_paragraph.is_empty() {
                first_paragraph_done = true;
            }
            continue;
        }

        if in_description_section {
            section_description.push(trimmed);
        } else if !first_paragraph_done {
            first_paragraph.push(trimmed);
        }
    }

    let description = if section_description.is_empty() {
        collapse(&first_paragraph)
    } else {
        collapse(&section_description)
    };

    Extracted {
        title: heading_title.or(metadata_title),
        priority,
        complexity,
        body: RecordBody {
            description,
            subtasks,
        },
    }
}

fn clean_title(text: &str) -> Option<String> {
    let stripped = FEATURE_PREFIX.replace(text, "");
    let title = stripped.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn clean_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches(&['*', '`', '_'][..]).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn collapse(lines: &[&str]) -> Option<String> {
    let joined = lines
        .iter()
        .flat_map(|l| l.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
