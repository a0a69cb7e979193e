use backup_sorter_core::is_valid_format;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recursive: bool,
    pub include_hidden: bool,
    pub substitute_identities: bool,
    pub substitute_parts: bool,
    /// Filename part to replacement; an empty value deletes the part.
    pub part_replacements: HashMap<String, String>,
    /// Extensions that are never renamed or moved.
    pub passthrough_extensions: Vec<String>,
    /// File stems whose extension is taken as their type without sniffing.
    pub reserved_names: Vec<String>,
    pub reserved_extensions: Vec<String>,
    /// Table stems that are neither indexed nor transcribed.
    pub skip_tables: Vec<String>,
    pub thumbnail: ThumbnailConfig,
    pub dedup_within_folder: bool,
    pub dedup_report: bool,
    pub remove_empty_folders: bool,
    pub apply_timestamps: bool,
    pub timestamp_format: String,
    pub transcript_timestamp_format: String,
    pub use_utc: bool,
    pub transcript_name: String,
    pub duplicates_report_name: String,
    /// Author shown for outgoing messages.
    pub own_name: String,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub thumbnail_part: String,
    pub original_part: String,
    pub auto_delete: bool,
    pub found_marker: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            thumbnail_part: "thumbnail".to_string(),
            original_part: "media".to_string(),
            auto_delete: true,
            found_marker: "found-duplicate_".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive: false,
            include_hidden: false,
            substitute_identities: true,
            substitute_parts: true,
            part_replacements: default_part_replacements(),
            passthrough_extensions: strings(&["csv", "txt", "log"]),
            reserved_names: strings(&["identity", "settings"]),
            reserved_extensions: strings(&["json"]),
            skip_tables: strings(&["ballot", "ballot_choice", "ballot_vote", "distribution_list"]),
            thumbnail: ThumbnailConfig::default(),
            dedup_within_folder: true,
            dedup_report: true,
            remove_empty_folders: true,
            apply_timestamps: true,
            timestamp_format: "%Y-%m-%d_%H-%M-%S".to_string(),
            transcript_timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            use_utc: false,
            transcript_name: "messages.txt".to_string(),
            duplicates_report_name: "duplicates.txt".to_string(),
            own_name: "me".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail partway through a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        let patterns = [
            ("timestamp_format", &self.timestamp_format),
            ("transcript_timestamp_format", &self.transcript_timestamp_format),
        ];
        match patterns.iter().find(|(_, p)| !is_valid_format(p)) {
            Some((name, pattern)) => anyhow::bail!("invalid {} `{}`", name, pattern),
            None => Ok(()),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(Into::into)
    }

    pub fn is_passthrough(&self, extension: &str) -> bool {
        contains_ignore_case(&self.passthrough_extensions, extension)
    }

    pub fn is_reserved(&self, stem: &str, extension: &str) -> bool {
        contains_ignore_case(&self.reserved_names, stem)
            || contains_ignore_case(&self.reserved_extensions, extension)
    }

    pub fn is_skipped_table(&self, stem: &str) -> bool {
        contains_ignore_case(&self.skip_tables, stem)
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    !value.is_empty() && list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_part_replacements() -> HashMap<String, String> {
    [("message", ""), ("media", ""), ("group", "")]
        .into_iter()
        .map(|(part, replacement)| (part.to_string(), replacement.to_string()))
        .collect()
}
