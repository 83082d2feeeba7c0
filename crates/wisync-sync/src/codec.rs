//! Front-matter note codec
//!
//! Notes are markdown files with a YAML front matter block carrying the
//! work item's fields; the body is the description:
//!
//! ```text
//! ---
//! id: 12
//! title: Fix login button
//! type: Task
//! state: Active
//! assigned_to: Jane Doe
//! priority: 2
//! tags:
//! - frontend
//! last_pulled: 2024-06-01T10:00:00+00:00
//! ---
//!
//! The button does nothing on Safari.
//! ```
//!
//! `last_pulled`, `last_pushed` and `synced_at` are volatile and ignored when
//! comparing notes.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_yaml::{Mapping, Value};

use wisync_core::domain::FieldUpdates;
use wisync_core::ports::{IContentCodec, RemoteItem};

/// Front matter keys that change on every sync and never count as edits
pub const VOLATILE_KEYS: &[&str] = &["last_pulled", "last_pushed", "synced_at"];

const DELIMITER: &str = "---";

/// [`IContentCodec`] for YAML front matter + markdown body notes
#[derive(Debug, Clone, Default)]
pub struct FrontmatterCodec;

impl FrontmatterCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Splits a note into its front matter (without delimiters) and body
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Trailing whitespace per line and surrounding blank lines are not content
fn normalize_body(body: &str) -> String {
    let lines: Vec<&str> = body.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

fn parse_mapping(front: &str) -> Result<Mapping> {
    if front.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(front).context("Invalid front matter")? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => anyhow::bail!("Front matter is not a mapping: {other:?}"),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tags_from(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(s) => s
            .split([';', ','])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl IContentCodec for FrontmatterCodec {
    fn render(&self, item: &RemoteItem) -> String {
        let mut front = Mapping::new();
        front.insert("id".into(), Value::from(item.id));
        front.insert("title".into(), Value::from(item.title.as_str()));
        front.insert("type".into(), Value::from(item.work_item_type.as_str()));
        front.insert("state".into(), Value::from(item.state.as_str()));
        front.insert("assigned_to".into(), Value::from(item.assigned_to.as_str()));
        front.insert("priority".into(), Value::from(item.priority.as_str()));
        front.insert(
            "tags".into(),
            Value::Sequence(item.tags.iter().map(|t| Value::from(t.as_str())).collect()),
        );
        front.insert("last_pulled".into(), Value::from(Utc::now().to_rfc3339()));

        // A mapping of plain scalars always serializes.
        let yaml = serde_yaml::to_string(&front).unwrap_or_default();
        format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}\n", item.description.trim_end())
    }

    fn normalize(&self, text: &str) -> String {
        let (front, body) = split_front_matter(text);
        let body = normalize_body(body);

        let Some(front) = front else {
            return body;
        };

        let front = match parse_mapping(front) {
            Ok(mut mapping) => {
                for key in VOLATILE_KEYS {
                    mapping.remove(*key);
                }
                serde_yaml::to_string(&mapping).unwrap_or_default()
            }
            // Unparseable front matter still compares line by line.
            Err(_) => front
                .lines()
                .map(str::trim_end)
                .filter(|line| {
                    !VOLATILE_KEYS
                        .iter()
                        .any(|key| line.starts_with(&format!("{key}:")))
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        format!("{DELIMITER}\n{}\n{DELIMITER}\n{body}", front.trim_end())
    }

    fn extract_field_updates(&self, text: &str) -> Result<FieldUpdates> {
        let (front, body) = split_front_matter(text);
        let mapping = match front {
            Some(front) => parse_mapping(front)?,
            None => Mapping::new(),
        };

        let field = |key: &str| mapping.get(key).and_then(scalar_to_string);

        Ok(FieldUpdates {
            title: field("title"),
            description: Some(normalize_body(body)),
            state: field("state"),
            assigned_to: field("assigned_to"),
            priority: field("priority"),
            tags: mapping.get("tags").map(tags_from),
        })
    }
}
