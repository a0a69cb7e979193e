use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::table::TableError;
use backup_sorter_core::{DuplicateUid, RowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Enumerate,
    IndexIdentities,
    IndexTimestampsAndExtractText,
    ThumbnailElimination,
    ClassifyAndRename,
    WithinFolderDedup,
    ArchiveWideDedupReport,
    EmptyFolderCleanup,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enumerate => "enumerate files",
            Self::IndexIdentities => "index contacts and groups",
            Self::IndexTimestampsAndExtractText => "index messages and write transcripts",
            Self::ThumbnailElimination => "eliminate thumbnails",
            Self::ClassifyAndRename => "classify and rename",
            Self::WithinFolderDedup => "remove duplicates per folder",
            Self::ArchiveWideDedupReport => "report duplicates",
            Self::EmptyFolderCleanup => "remove empty folders",
            Self::Done => "done",
        })
    }
}

/// Per-item problems. None of these stop a run.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("failed to read table {}: {source}", .path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("{0}")]
    IdentityRow(#[from] RowError),
    #[error("{}: row {row}: {reason}", .path.display())]
    MessageRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },
    #[error("integrity anomaly in {}: {source}", .path.display())]
    DuplicateUid {
        path: PathBuf,
        #[source]
        source: DuplicateUid,
    },
    #[error("integrity anomaly: {} carries several message uids; used `{used}`, ignored {ignored:?}", .path.display())]
    AmbiguousUid {
        path: PathBuf,
        used: String,
        ignored: Vec<String>,
    },
    #[error("type undetermined for {}, keeping its extension", .path.display())]
    TypeUndetermined { path: PathBuf },
    #[error("failed to create folder {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to overwrite {}", .path.display())]
    Occupied { path: PathBuf },
    #[error("failed to delete {}: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to hash {}: {source}", .path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set times on {}: {source}", .path.display())]
    SetTimes {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SortError {
    pub fn is_integrity_anomaly(&self) -> bool {
        matches!(self, Self::DuplicateUid { .. } | Self::AmbiguousUid { .. })
    }

    /// Anomalies at error level, everything else as a warning.
    pub fn log(&self) {
        match self.is_integrity_anomaly() {
            true => tracing::error!("{}", self),
            false => tracing::warn!("{}", self),
        }
    }
}

#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub processed: usize,
    pub issues: Vec<SortError>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            issues: Vec::new(),
        }
    }

    pub fn record(&mut self, issue: SortError) {
        issue.log();
        self.issues.push(issue);
    }

    pub fn record_all(&mut self, issues: impl IntoIterator<Item = SortError>) {
        issues.into_iter().for_each(|issue| self.record(issue));
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub files_found: usize,
    pub identities: usize,
    pub messages_indexed: usize,
    pub transcripts_written: usize,
    pub thumbnails_deleted: usize,
    pub thumbnails_marked: usize,
    pub files_moved: usize,
    pub duplicates_deleted: usize,
    pub duplicate_groups: usize,
    pub folders_removed: usize,
    pub duplicates_report: Option<PathBuf>,
}

impl RunReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn issues(&self) -> impl Iterator<Item = &SortError> {
        self.stages.iter().flat_map(|s| s.issues.iter())
    }

    pub fn anomaly_count(&self) -> usize {
        self.issues().filter(|i| i.is_integrity_anomaly()).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files found:          {}", self.files_found)?;
        writeln!(f, "Identities:           {}", self.identities)?;
        writeln!(f, "Messages indexed:     {}", self.messages_indexed)?;
        writeln!(f, "Transcripts written:  {}", self.transcripts_written)?;
        writeln!(
            f,
            "Thumbnails:           {} deleted, {} marked",
            self.thumbnails_deleted, self.thumbnails_marked
        )?;
        writeln!(f, "Files moved/renamed:  {}", self.files_moved)?;
        writeln!(f, "Duplicates deleted:   {}", self.duplicates_deleted)?;
        writeln!(f, "Duplicate groups:     {}", self.duplicate_groups)?;
        writeln!(f, "Folders removed:      {}", self.folders_removed)?;
        if let Some(path) = &self.duplicates_report {
            writeln!(f, "Duplicate manifest:   {}", path.display())?;
        }

        let issues = self.issues().count();
        write!(
            f,
            "Issues:               {} ({} integrity anomalies)",
            issues,
            self.anomaly_count()
        )
    }
}
