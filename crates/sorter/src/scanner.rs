use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub include_hidden: bool,
}

/// A file found in the archive, plus what the pipeline learns about it.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub directory: PathBuf,
    pub base_name: String,
    pub extension: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    /// Candidate name; starts as `base_name`.
    pub working_name: String,
    pub thumbnail_marked: bool,
    pub fingerprint: Option<String>,
    /// Disambiguation suffix and final name; lower ranks survive deduplication.
    pub rank: (u32, String),
}

impl FileEntry {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = file_name(&base_name, &extension);

        Ok(Self {
            path: path.to_path_buf(),
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            working_name: base_name.clone(),
            base_name,
            extension,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
            thumbnail_marked: false,
            fingerprint: None,
            rank: (0, file_name),
        })
    }

    pub fn file_name(&self) -> String {
        file_name(&self.base_name, &self.extension)
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.extension.eq_ignore_ascii_case(extension)
    }

    /// Point the entry at its new location after a move.
    pub fn relocate(self, path: PathBuf, rank: (u32, String)) -> Self {
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            working_name: base_name.clone(),
            base_name,
            extension,
            path,
            rank,
            ..self
        }
    }
}

pub fn file_name(base: &str, extension: &str) -> String {
    match extension {
        "" => base.to_string(),
        ext => format!("{}.{}", base, ext),
    }
}

pub fn scan_directory(path: &Path, options: &ScanOptions) -> Vec<FileEntry> {
    let walker = match options.recursive {
        true => WalkDir::new(path),
        false => WalkDir::new(path).max_depth(1),
    };

    // Hidden directories are pruned whole; the root itself is always walked.
    let is_visible = |entry: &walkdir::DirEntry| -> bool {
        entry.depth() == 0 || options.include_hidden || !is_hidden(entry.path())
    };

    walker
        .into_iter()
        .filter_entry(is_visible)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match FileEntry::from_path(entry.path()) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("failed to stat {}: {}", entry.path().display(), e);
                None
            }
        })
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Directories below `root` that are empty, deepest first, so removing them
/// in order can empty their parents too.
pub fn empty_dir_candidates(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    dirs.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| b.cmp(a)));
    dirs
}

fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Remove `dir` if it has no entries left. Returns whether it was removed.
pub fn remove_if_empty(dir: &Path) -> std::io::Result<bool> {
    match std::fs::read_dir(dir)?.next() {
        Some(_) => Ok(false),
        None => std::fs::remove_dir(dir).map(|_| true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_parses_name_parts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("message_media_uid001"), b"data").unwrap();
        fs::write(dir.path().join("contacts.csv"), b"identity\n").unwrap();

        let mut files = scan_directory(dir.path(), &ScanOptions::default());
        files.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].base_name, "contacts");
        assert_eq!(files[0].extension, "csv");
        assert_eq!(files[1].base_name, "message_media_uid001");
        assert_eq!(files[1].extension, "");
        assert_eq!(files[1].working_name, "message_media_uid001");
        assert_eq!(files[1].size, 4);
    }

    #[test]
    fn scan_excludes_hidden() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("media_a"), b"a").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();

        assert_eq!(scan_directory(dir.path(), &ScanOptions::default()).len(), 1);
    }

    #[test]
    fn recursive_scan_prunes_hidden_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".thumbnails")).unwrap();
        fs::write(dir.path().join(".thumbnails/thumb_a"), b"t").unwrap();
        fs::write(dir.path().join("media_a"), b"a").unwrap();

        let visible = scan_directory(
            dir.path(),
            &ScanOptions {
                recursive: true,
                include_hidden: false,
            },
        );
        let all = scan_directory(
            dir.path(),
            &ScanOptions {
                recursive: true,
                include_hidden: true,
            },
        );

        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].base_name, "media_a");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn flat_scan_skips_subdirectories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top"), b"a").unwrap();
        fs::write(dir.path().join("sub/nested"), b"b").unwrap();

        let flat = scan_directory(dir.path(), &ScanOptions::default());
        let deep = scan_directory(
            dir.path(),
            &ScanOptions {
                recursive: true,
                ..Default::default()
            },
        );

        assert_eq!(flat.len(), 1);
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn empty_dirs_are_listed_deepest_first() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/keep"), b"k").unwrap();

        let candidates = empty_dir_candidates(dir.path());
        assert_eq!(candidates[0], dir.path().join("a/b/c"));

        let removed: Vec<bool> = candidates
            .iter()
            .map(|d| remove_if_empty(d).unwrap())
            .collect();

        assert_eq!(removed.iter().filter(|r| **r).count(), 3);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("d/keep").exists());
    }

    #[test]
    fn relocate_refreshes_name_parts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uid001");
        fs::write(&path, b"x").unwrap();

        let entry = FileEntry::from_path(&path).unwrap();
        let moved = entry.relocate(dir.path().join("Max/2022-04-15.jpg"), (0, "2022-04-15.jpg".into()));

        assert_eq!(moved.base_name, "2022-04-15");
        assert_eq!(moved.extension, "jpg");
        assert_eq!(moved.directory, dir.path().join("Max"));
    }
}
