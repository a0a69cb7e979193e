use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use backup_sorter_core::{
    format_timestamp, from_epoch_millis, infer_extension, match_identity, replace_parts,
    sanitize, tokenize, IdentityIndex, IdentityKind, Row, Substitution, TimestampEntry,
    TimestampIndex,
};

use crate::config::Config;
use crate::report::SortError;
use crate::scanner::FileEntry;

pub const CONTACT_COLUMNS: &[&str] = &["identity"];
pub const GROUP_COLUMNS: &[&str] = &["id", "creator"];
pub const MESSAGE_COLUMNS: &[&str] = &["uid", "type", "created_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Contacts,
    Groups,
    Skipped,
    Conversation,
}

/// Classify a CSV file; `None` for anything that is not a table.
pub fn table_kind(file: &FileEntry, config: &Config) -> Option<TableKind> {
    if !file.has_extension("csv") {
        return None;
    }
    let stem = file.base_name.as_str();
    Some(if stem.eq_ignore_ascii_case("contacts") {
        TableKind::Contacts
    } else if stem.eq_ignore_ascii_case("groups") {
        TableKind::Groups
    } else if config.is_skipped_table(stem) {
        TableKind::Skipped
    } else {
        TableKind::Conversation
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub uid: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub caption: String,
    /// Sender identity for group messages.
    pub sender: Option<String>,
    pub outgoing: bool,
    pub position: usize,
}

impl MessageRecord {
    pub fn from_row(row: &Row, position: usize) -> Result<Self, String> {
        let field = |name: &str| row.get(name).map(|v| v.trim()).unwrap_or("");

        let created_at = from_epoch_millis(field("created_at"))
            .ok_or_else(|| format!("unreadable created_at `{}`", field("created_at")))?;
        let kind = field("type").to_string();
        let uid = field("uid").to_string();

        if uid.is_empty() && !kind.eq_ignore_ascii_case("text") {
            return Err("attachment row without uid".to_string());
        }

        Ok(Self {
            uid,
            kind,
            created_at,
            body: row.get("body").cloned().unwrap_or_default(),
            caption: row.get("caption").cloned().unwrap_or_default(),
            sender: Some(field("identity"))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            outgoing: matches!(field("isoutbox"), "1" | "true"),
            position,
        })
    }

    pub fn is_text(&self) -> bool {
        self.kind.eq_ignore_ascii_case("text")
    }

    /// Transcript text: the body of text messages, the caption of anything else.
    pub fn text(&self) -> Option<String> {
        let raw = match self.is_text() {
            true => &self.body,
            false => &self.caption,
        };
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        (!cleaned.is_empty()).then_some(cleaned)
    }
}

#[derive(Debug, Clone)]
pub struct ConversationTable {
    pub source: PathBuf,
    /// Key of the contact or group this conversation belongs to.
    pub identity: Option<String>,
    pub folder: String,
    pub records: Vec<MessageRecord>,
}

impl ConversationTable {
    /// Parse rows and resolve the folder. Rows that cannot be read are
    /// returned as issues and left out.
    pub fn from_rows(
        source: &Path,
        rows: &[Row],
        identities: &IdentityIndex,
        substitution: &Substitution<'_>,
    ) -> (Self, Vec<SortError>) {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (identity, folder) = resolve_folder(&stem, identities, substitution);

        let (records, issues) = rows.iter().enumerate().fold(
            (Vec::new(), Vec::new()),
            |(mut records, mut issues), (i, row)| {
                match MessageRecord::from_row(row, i) {
                    Ok(record) => records.push(record),
                    Err(reason) => issues.push(SortError::MessageRow {
                        path: source.to_path_buf(),
                        row: i + 1,
                        reason,
                    }),
                }
                (records, issues)
            },
        );

        (
            Self {
                source: source.to_path_buf(),
                identity,
                folder,
                records,
            },
            issues,
        )
    }

    /// Add one entry per attachment row. Collisions keep the earlier entry.
    pub fn index_timestamps(&self, index: &mut TimestampIndex) -> (usize, Vec<SortError>) {
        self.records
            .iter()
            .filter(|r| !r.is_text())
            .fold((0, Vec::new()), |(mut added, mut issues), record| {
                let entry = TimestampEntry {
                    timestamp: record.created_at,
                    folder: self.folder.clone(),
                    inferred_extension: infer_extension(&record.body),
                };
                match index.insert(&record.uid, entry) {
                    Ok(()) => added += 1,
                    Err(source) => issues.push(SortError::DuplicateUid {
                        path: self.source.clone(),
                        source,
                    }),
                }
                (added, issues)
            })
    }

    pub fn transcript_lines(
        &self,
        table_order: usize,
        identities: &IdentityIndex,
        config: &Config,
    ) -> Vec<TranscriptLine> {
        let partner = self
            .identity
            .as_deref()
            .and_then(|key| identities.get(key))
            .filter(|identity| identity.kind == IdentityKind::Contact)
            .map(|identity| identity.display_name.clone());

        self.records
            .iter()
            .filter_map(|record| {
                let text = record.text()?;
                let author = match (&record.sender, record.outgoing) {
                    (Some(sender), _) => Some(
                        identities
                            .get(sender)
                            .map(|i| i.display_name.clone())
                            .unwrap_or_else(|| sender.clone()),
                    ),
                    (None, true) => Some(config.own_name.clone()),
                    (None, false) => partner.clone(),
                };
                Some(TranscriptLine {
                    timestamp: record.created_at,
                    table: table_order,
                    row: record.position,
                    text,
                    author,
                })
            })
            .collect()
    }
}

/// Matched identity key and folder name for a conversation table.
pub fn resolve_folder(
    stem: &str,
    identities: &IdentityIndex,
    substitution: &Substitution<'_>,
) -> (Option<String>, String) {
    let tokens = tokenize(stem);
    match match_identity(&tokens, identities) {
        Some(found) => (
            Some(found.identity.key.clone()),
            found.identity.display_name.clone(),
        ),
        None => {
            let name = replace_parts(&tokens, substitution);
            let name = match name.is_empty() {
                true => sanitize(stem),
                false => name,
            };
            (None, name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub timestamp: DateTime<Utc>,
    pub table: usize,
    pub row: usize,
    pub text: String,
    pub author: Option<String>,
}

impl TranscriptLine {
    pub fn render(&self, config: &Config) -> String {
        let when = format_timestamp(
            &self.timestamp,
            &config.transcript_timestamp_format,
            config.use_utc,
        );
        match &self.author {
            Some(author) => format!("[{}] {} [{}]", when, self.text, author),
            None => format!("[{}] {}", when, self.text),
        }
    }
}

/// Merge lines of every table that shares a folder, in message order.
pub fn group_transcripts<I>(lines: I) -> BTreeMap<String, Vec<TranscriptLine>>
where
    I: IntoIterator<Item = (String, TranscriptLine)>,
{
    let mut grouped = lines.into_iter().fold(
        BTreeMap::<String, Vec<TranscriptLine>>::new(),
        |mut acc, (folder, line)| {
            acc.entry(folder).or_default().push(line);
            acc
        },
    );
    grouped.values_mut().for_each(|lines| {
        lines.sort_by(|a, b| {
            (a.timestamp, a.table, a.row).cmp(&(b.timestamp, b.table, b.row))
        })
    });
    grouped
}

/// Write one transcript per folder. Returns the written paths.
pub fn write_transcripts(
    root: &Path,
    transcripts: &BTreeMap<String, Vec<TranscriptLine>>,
    config: &Config,
) -> (Vec<PathBuf>, Vec<SortError>) {
    transcripts
        .iter()
        .filter(|(_, lines)| !lines.is_empty())
        .fold((Vec::new(), Vec::new()), |(mut written, mut issues), (folder, lines)| {
            let dir = root.join(folder);
            let path = dir.join(&config.transcript_name);
            let content: String = lines
                .iter()
                .map(|line| line.render(config) + "\n")
                .collect();

            let result = std::fs::create_dir_all(&dir)
                .map_err(|source| SortError::CreateDir {
                    path: dir.clone(),
                    source,
                })
                .and_then(|_| {
                    std::fs::write(&path, content).map_err(|source| SortError::Write {
                        path: path.clone(),
                        source,
                    })
                });

            match result {
                Ok(()) => written.push(path),
                Err(e) => issues.push(e),
            }
            (written, issues)
        })
}

/// Identity key to folder, for every conversation matched to an identity.
pub fn conversation_folders(tables: &[ConversationTable]) -> HashMap<String, String> {
    tables
        .iter()
        .filter_map(|t| t.identity.clone().map(|key| (key, t.folder.clone())))
        .fold(HashMap::new(), |mut acc, (key, folder)| {
            acc.entry(key).or_insert(folder);
            acc
        })
}
