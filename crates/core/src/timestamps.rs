use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampEntry {
    pub timestamp: DateTime<Utc>,
    /// Conversation folder name, relative to the archive root.
    pub folder: String,
    pub inferred_extension: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("message uid `{uid}` already indexed from another row; keeping the first entry")]
pub struct DuplicateUid {
    pub uid: String,
}

/// Message uid to timestamp and destination. First write wins.
#[derive(Debug, Clone, Default)]
pub struct TimestampIndex {
    entries: HashMap<String, TimestampEntry>,
}

impl TimestampIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uid: &str, entry: TimestampEntry) -> Result<(), DuplicateUid> {
        if self.entries.contains_key(uid) {
            return Err(DuplicateUid {
                uid: uid.to_string(),
            });
        }
        self.entries.insert(uid.to_string(), entry);
        Ok(())
    }

    pub fn get(&self, uid: &str) -> Option<&TimestampEntry> {
        self.entries.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attachment bodies are JSON arrays; the fifth element is the original
/// file name. Anything else yields no hint. The hint is lowercased so it
/// compares equal to sniffed extensions.
pub fn infer_extension(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let name = value.as_array()?.get(4)?.as_str()?;
    name.rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn from_epoch_millis(value: &str) -> Option<DateTime<Utc>> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Whether chrono can render `pattern`. Unknown specifiers make formatting
/// panic, so patterns from configuration are checked up front.
pub fn is_valid_format(pattern: &str) -> bool {
    StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

/// Render with a chrono pattern, in UTC or the host's local zone. The pattern
/// must pass `is_valid_format`.
pub fn format_timestamp(timestamp: &DateTime<Utc>, pattern: &str, utc: bool) -> String {
    match utc {
        true => timestamp.format(pattern).to_string(),
        false => timestamp.with_timezone(&Local).format(pattern).to_string(),
    }
}
