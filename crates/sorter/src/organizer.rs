use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use backup_sorter_core::{IdentityIndex, Row, TimestampIndex};

use crate::config::Config;
use crate::conversation::{
    conversation_folders, group_transcripts, table_kind, write_transcripts, ConversationTable,
    TableKind, CONTACT_COLUMNS, GROUP_COLUMNS, MESSAGE_COLUMNS,
};
use crate::dedup::{
    find_duplicates, find_folder_duplicates, find_thumbnails, fingerprint_all, render_manifest,
};
use crate::naming::{substitution, NamingPolicy};
use crate::report::{RunReport, SortError, Stage, StageReport};
use crate::scanner::{empty_dir_candidates, remove_if_empty, scan_directory, FileEntry, ScanOptions};
use crate::sniff::{MagicSniffer, TypeSniffer};
use crate::table::read_table;

/// Runs the whole reconciliation over one backup directory.
pub struct Organizer {
    source: PathBuf,
    config: Config,
    sniffer: Box<dyn TypeSniffer>,
}

struct Conversations {
    tables: Vec<ConversationTable>,
    timestamps: TimestampIndex,
    messages: usize,
    transcripts: usize,
}

/// Pure planning result for one file.
struct PlannedMove {
    file: FileEntry,
    target: PathBuf,
    rank: (u32, String),
    timestamp: Option<DateTime<Utc>>,
}

impl Organizer {
    pub fn new(source: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            source: source.into(),
            config,
            sniffer: Box::new(MagicSniffer),
        }
    }

    pub fn with_sniffer(self, sniffer: Box<dyn TypeSniffer>) -> Self {
        Self { sniffer, ..self }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> anyhow::Result<RunReport> {
        self.run_with_progress(|_| {})
    }

    /// Only invalid settings or a missing or empty source directory fail the
    /// run; everything else lands in the report.
    pub fn run_with_progress<F>(&self, mut on_stage: F) -> anyhow::Result<RunReport>
    where
        F: FnMut(Stage),
    {
        self.config.validate()?;
        let mut report = RunReport::default();

        on_stage(Stage::Enumerate);
        let files = self.enumerate()?;
        report.files_found = files.len();
        finish(&mut report, StageReport {
            processed: files.len(),
            ..StageReport::new(Stage::Enumerate)
        });

        on_stage(Stage::IndexIdentities);
        let (identities, stage) = self.index_identities(&files);
        report.identities = identities.len();
        finish(&mut report, stage);

        on_stage(Stage::IndexTimestampsAndExtractText);
        let (conversations, stage) = self.index_conversations(&files, &identities);
        report.messages_indexed = conversations.messages;
        report.transcripts_written = conversations.transcripts;
        finish(&mut report, stage);

        on_stage(Stage::ThumbnailElimination);
        let (files, stage) = self.eliminate_thumbnails(files, &mut report);
        finish(&mut report, stage);

        on_stage(Stage::ClassifyAndRename);
        let folders = conversation_folders(&conversations.tables);
        let policy = NamingPolicy::new(
            &self.config,
            &self.source,
            &identities,
            &conversations.timestamps,
            &folders,
            self.sniffer.as_ref(),
        );
        let (files, stage) = self.classify_and_rename(files, &policy, &mut report);
        finish(&mut report, stage);

        let (files, mut hash_issues) = match self.config.dedup_within_folder || self.config.dedup_report {
            true => fingerprint_all(files),
            false => (files, Vec::new()),
        };

        let files = match self.config.dedup_within_folder {
            true => {
                on_stage(Stage::WithinFolderDedup);
                let mut stage = StageReport::new(Stage::WithinFolderDedup);
                stage.record_all(std::mem::take(&mut hash_issues));
                let files = self.dedup_within_folders(files, &mut stage, &mut report);
                finish(&mut report, stage);
                files
            }
            false => files,
        };

        if self.config.dedup_report {
            on_stage(Stage::ArchiveWideDedupReport);
            let mut stage = StageReport::new(Stage::ArchiveWideDedupReport);
            stage.record_all(std::mem::take(&mut hash_issues));
            self.report_duplicates(&files, &mut stage, &mut report);
            finish(&mut report, stage);
        }

        if self.config.remove_empty_folders {
            on_stage(Stage::EmptyFolderCleanup);
            let stage = self.remove_empty_folders(&mut report);
            finish(&mut report, stage);
        }

        on_stage(Stage::Done);
        tracing::info!(
            "finished: {} files moved, {} duplicates deleted, {} issues",
            report.files_moved,
            report.duplicates_deleted,
            report.issues().count()
        );
        Ok(report)
    }

    fn enumerate(&self) -> anyhow::Result<Vec<FileEntry>> {
        if !self.source.is_dir() {
            anyhow::bail!("source directory {} does not exist", self.source.display());
        }

        let options = ScanOptions {
            recursive: self.config.recursive,
            include_hidden: self.config.include_hidden,
        };
        let mut files = scan_directory(&self.source, &options);
        if files.is_empty() {
            anyhow::bail!("source directory {} contains no files", self.source.display());
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn read_tables(
        &self,
        files: &[FileEntry],
        kind: TableKind,
        columns: &[&str],
        stage: &mut StageReport,
    ) -> Vec<Row> {
        files
            .iter()
            .filter(|f| table_kind(f, &self.config) == Some(kind))
            .flat_map(|f| match read_table(&f.path, columns) {
                Ok(rows) => {
                    stage.processed += 1;
                    rows
                }
                Err(source) => {
                    stage.record(SortError::Table {
                        path: f.path.clone(),
                        source,
                    });
                    Vec::new()
                }
            })
            .collect()
    }

    fn index_identities(&self, files: &[FileEntry]) -> (IdentityIndex, StageReport) {
        let mut stage = StageReport::new(Stage::IndexIdentities);
        let contacts = self.read_tables(files, TableKind::Contacts, CONTACT_COLUMNS, &mut stage);
        let groups = self.read_tables(files, TableKind::Groups, GROUP_COLUMNS, &mut stage);

        let (index, rejected) = IdentityIndex::build(&contacts, &groups);
        stage.record_all(rejected.into_iter().map(SortError::from));
        (index, stage)
    }

    fn index_conversations(
        &self,
        files: &[FileEntry],
        identities: &IdentityIndex,
    ) -> (Conversations, StageReport) {
        let mut stage = StageReport::new(Stage::IndexTimestampsAndExtractText);
        let substitution = substitution(&self.config, identities);
        let mut timestamps = TimestampIndex::new();
        let mut tables = Vec::new();
        let mut lines = Vec::new();
        let mut messages = 0;

        let sources = files
            .iter()
            .filter(|f| table_kind(f, &self.config) == Some(TableKind::Conversation));

        for file in sources {
            let rows = match read_table(&file.path, MESSAGE_COLUMNS) {
                Ok(rows) if rows.is_empty() => {
                    tracing::debug!("{} holds no messages", file.path.display());
                    continue;
                }
                Ok(rows) => rows,
                Err(source) => {
                    stage.record(SortError::Table {
                        path: file.path.clone(),
                        source,
                    });
                    continue;
                }
            };

            let (table, issues) =
                ConversationTable::from_rows(&file.path, &rows, identities, &substitution);
            stage.record_all(issues);

            let (added, issues) = table.index_timestamps(&mut timestamps);
            stage.record_all(issues);
            messages += added;

            let order = tables.len();
            lines.extend(
                table
                    .transcript_lines(order, identities, &self.config)
                    .into_iter()
                    .map(|line| (table.folder.clone(), line)),
            );
            stage.processed += 1;
            tables.push(table);
        }

        let transcripts = group_transcripts(lines);
        let (written, issues) = write_transcripts(&self.source, &transcripts, &self.config);
        stage.record_all(issues);

        let conversations = Conversations {
            tables,
            timestamps,
            messages,
            transcripts: written.len(),
        };
        (conversations, stage)
    }

    fn eliminate_thumbnails(
        &self,
        files: Vec<FileEntry>,
        report: &mut RunReport,
    ) -> (Vec<FileEntry>, StageReport) {
        let mut stage = StageReport::new(Stage::ThumbnailElimination);
        let settings = &self.config.thumbnail;
        let thumbnails = find_thumbnails(&files, settings);
        stage.processed = thumbnails.len();

        let files = files
            .into_iter()
            .filter_map(|file| {
                if !thumbnails.contains(&file.path) {
                    return Some(file);
                }
                if !settings.auto_delete {
                    report.thumbnails_marked += 1;
                    return Some(FileEntry {
                        working_name: format!("{}{}", settings.found_marker, file.working_name),
                        thumbnail_marked: true,
                        ..file
                    });
                }
                match std::fs::remove_file(&file.path) {
                    Ok(()) => {
                        tracing::debug!("deleted thumbnail {}", file.path.display());
                        report.thumbnails_deleted += 1;
                        None
                    }
                    Err(source) => {
                        stage.record(SortError::Delete {
                            path: file.path.clone(),
                            source,
                        });
                        Some(file)
                    }
                }
            })
            .collect();

        (files, stage)
    }

    fn classify_and_rename(
        &self,
        files: Vec<FileEntry>,
        policy: &NamingPolicy<'_>,
        report: &mut RunReport,
    ) -> (Vec<FileEntry>, StageReport) {
        let mut stage = StageReport::new(Stage::ClassifyAndRename);
        let plans = plan_moves(files, policy, &mut stage);

        let files = plans
            .into_iter()
            .map(|plan| {
                stage.processed += 1;
                let (file, moved, issues) = execute_move(plan, &self.config);
                if moved {
                    report.files_moved += 1;
                }
                stage.record_all(issues);
                file
            })
            .collect();

        (files, stage)
    }

    fn dedup_within_folders(
        &self,
        files: Vec<FileEntry>,
        stage: &mut StageReport,
        report: &mut RunReport,
    ) -> Vec<FileEntry> {
        let live: HashSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
        let groups = find_folder_duplicates(&files);
        stage.processed = groups.len();

        let removed: HashSet<PathBuf> = groups
            .iter()
            .flat_map(|group| group.iter().skip(1))
            .filter(|file| live.contains(file.path.as_path()))
            .filter_map(|file| match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    tracing::debug!("deleted duplicate {}", file.path.display());
                    Some(file.path.clone())
                }
                Err(source) => {
                    stage.record(SortError::Delete {
                        path: file.path.clone(),
                        source,
                    });
                    None
                }
            })
            .collect();

        report.duplicates_deleted += removed.len();
        files
            .into_iter()
            .filter(|f| !removed.contains(&f.path))
            .collect()
    }

    fn report_duplicates(&self, files: &[FileEntry], stage: &mut StageReport, report: &mut RunReport) {
        let groups = find_duplicates(files);
        stage.processed = groups.len();
        report.duplicate_groups = groups.len();
        let path = self.source.join(&self.config.duplicates_report_name);

        if groups.is_empty() {
            tracing::info!("no duplicates across the archive");
            // A manifest from an earlier run would list stale paths.
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed stale {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => stage.record(SortError::Delete { path, source }),
            }
            return;
        }

        match std::fs::write(&path, render_manifest(&groups, &self.source)) {
            Ok(()) => report.duplicates_report = Some(path),
            Err(source) => stage.record(SortError::Write { path, source }),
        }
    }

    fn remove_empty_folders(&self, report: &mut RunReport) -> StageReport {
        let mut stage = StageReport::new(Stage::EmptyFolderCleanup);

        for dir in empty_dir_candidates(&self.source) {
            stage.processed += 1;
            match remove_if_empty(&dir) {
                Ok(true) => report.folders_removed += 1,
                Ok(false) => {}
                Err(source) => stage.record(SortError::Delete { path: dir, source }),
            }
        }

        stage
    }
}

fn finish(report: &mut RunReport, stage: StageReport) {
    tracing::info!(
        "{}: {} processed, {} issues",
        stage.stage,
        stage.processed,
        stage.issues.len()
    );
    report.stages.push(stage);
}

/// Resolve every destination and reserve a unique path for each file.
fn plan_moves(
    files: Vec<FileEntry>,
    policy: &NamingPolicy<'_>,
    stage: &mut StageReport,
) -> Vec<PlannedMove> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    files
        .into_iter()
        .map(|file| {
            let resolution = policy.resolve(&file);
            stage.record_all(resolution.issues);
            let destination = resolution.destination;

            let mut suffix = 0;
            let target = loop {
                let candidate = destination.path_with_suffix(suffix);
                let free = candidate == file.path || !candidate.exists();
                if free && !claimed.contains(&candidate) {
                    break candidate;
                }
                suffix += 1;
            };
            claimed.insert(target.clone());
            tracing::debug!("plan {} -> {}", file.path.display(), target.display());

            PlannedMove {
                rank: (suffix, destination.file_name_with_suffix(0)),
                timestamp: destination.timestamp,
                file,
                target,
            }
        })
        .collect()
}

/// Apply one planned move. Returns the entry at its actual location.
fn execute_move(plan: PlannedMove, config: &Config) -> (FileEntry, bool, Vec<SortError>) {
    let PlannedMove {
        file,
        target,
        rank,
        timestamp,
    } = plan;
    let mut issues = Vec::new();

    let (file, moved) = if target == file.path {
        (FileEntry { rank, ..file }, false)
    } else {
        match move_file(&file.path, &target) {
            Ok(()) => (file.relocate(target, rank), true),
            Err(e) => {
                issues.push(e);
                return (file, false, issues);
            }
        }
    };

    if let Some(ts) = timestamp.filter(|_| config.apply_timestamps) {
        let time = FileTime::from_unix_time(ts.timestamp(), ts.timestamp_subsec_nanos());
        if let Err(source) = filetime::set_file_times(&file.path, time, time) {
            issues.push(SortError::SetTimes {
                path: file.path.clone(),
                source,
            });
        }
    }

    (file, moved, issues)
}

fn move_file(from: &Path, to: &Path) -> Result<(), SortError> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SortError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    if to.exists() {
        return Err(SortError::Occupied {
            path: to.to_path_buf(),
        });
    }
    std::fs::rename(from, to).map_err(|source| SortError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            use_utc: true,
            ..Config::default()
        }
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = Organizer::new(dir.path().join("nope"), config()).run();
        assert!(result.is_err());
    }

    #[test]
    fn empty_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = Organizer::new(dir.path(), config()).run();
        assert!(result.unwrap_err().to_string().contains("contains no files"));
    }

    #[test]
    fn invalid_timestamp_pattern_stops_before_any_stage() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("media_a.bin"), b"x").unwrap();

        let config = Config {
            timestamp_format: "%Y-%Q".to_string(),
            ..config()
        };
        let mut seen = Vec::new();
        let result = Organizer::new(dir.path(), config).run_with_progress(|s| seen.push(s));

        assert!(result.is_err());
        assert!(seen.is_empty());
        assert!(dir.path().join("media_a.bin").exists());
    }

    #[test]
    fn failed_move_is_reported_and_run_continues() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("contacts.csv"),
            "identity,lastname,firstname\nABCD1234,Muster,Max\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("message_ABCD1234.csv"),
            "uid,type,created_at,body\n1,text,1650000000000,hi\nuid001,image,1650000000000,\n",
        )
        .unwrap();
        // A plain file where the conversation folder has to go.
        fs::write(dir.path().join("Muster Max ABCD1234"), b"blocker").unwrap();
        fs::write(dir.path().join("uid001_ABCD1234"), b"\xFF\xD8\xFF\xE0one").unwrap();
        fs::write(dir.path().join("vacation_media.jpg"), b"\xFF\xD8\xFF\xE0two").unwrap();

        let report = Organizer::new(dir.path(), config()).run().unwrap();

        let classify = report.stage(Stage::ClassifyAndRename).unwrap();
        let failed_dirs = classify
            .issues
            .iter()
            .filter(|i| matches!(i, SortError::CreateDir { .. }))
            .count();
        assert_eq!(failed_dirs, 1);
        assert!(dir.path().join("uid001_ABCD1234").exists());

        assert!(dir.path().join("vacation.jpg").exists());
        assert!(!dir.path().join("vacation_media.jpg").exists());
        assert_eq!(report.files_moved, 1);

        let transcripts = report.stage(Stage::IndexTimestampsAndExtractText).unwrap();
        assert!(transcripts
            .issues
            .iter()
            .any(|i| matches!(i, SortError::CreateDir { .. })));
        assert_eq!(report.transcripts_written, 0);
    }

    #[test]
    fn move_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.jpg");
        let to = dir.path().join("b.jpg");
        fs::write(&from, b"a").unwrap();
        fs::write(&to, b"b").unwrap();

        let plan = PlannedMove {
            file: FileEntry::from_path(&from).unwrap(),
            target: to.clone(),
            rank: (0, "b.jpg".to_string()),
            timestamp: None,
        };
        let (file, moved, issues) = execute_move(plan, &config());

        assert!(!moved);
        assert_eq!(file.path, from);
        assert!(matches!(issues.as_slice(), [SortError::Occupied { .. }]));
        assert_eq!(fs::read(&to).unwrap(), b"b");
        assert!(from.exists());
    }

    #[test]
    fn colliding_destinations_get_suffixes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("media_photo.bin"), b"one").unwrap();
        fs::write(dir.path().join("photo.bin"), b"two").unwrap();
        fs::write(dir.path().join("message_photo.bin"), b"three").unwrap();

        let config = Config {
            dedup_report: false,
            ..config()
        };
        let report = Organizer::new(dir.path(), config).run().unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names, vec!["photo.bin", "photo_1.bin", "photo_2.bin"]);
        assert_eq!(report.files_moved, 2);
        let contents: HashSet<Vec<u8>> = names
            .iter()
            .map(|n| fs::read(dir.path().join(n)).unwrap())
            .collect();
        assert_eq!(contents.len(), 3);
    }

    #[test]
    fn skipped_stages_are_absent_from_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.bin"), b"x").unwrap();

        let config = Config {
            dedup_within_folder: false,
            dedup_report: false,
            remove_empty_folders: false,
            ..config()
        };
        let report = Organizer::new(dir.path(), config).run().unwrap();

        assert!(report.stage(Stage::ClassifyAndRename).is_some());
        assert!(report.stage(Stage::WithinFolderDedup).is_none());
        assert!(report.stage(Stage::ArchiveWideDedupReport).is_none());
        assert!(report.stage(Stage::EmptyFolderCleanup).is_none());
    }

    #[test]
    fn stages_are_announced_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.bin"), b"x").unwrap();

        let mut seen = Vec::new();
        Organizer::new(dir.path(), config())
            .run_with_progress(|stage| seen.push(stage))
            .unwrap();

        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        assert_eq!(seen.first(), Some(&Stage::Enumerate));
        assert_eq!(seen.last(), Some(&Stage::Done));
    }
}
