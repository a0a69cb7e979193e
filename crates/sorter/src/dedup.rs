use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::ThumbnailConfig;
use crate::report::SortError;
use crate::scanner::FileEntry;

/// Paths of files whose name turns into another file's name in the same
/// folder when the thumbnail part is swapped for the original part.
pub fn find_thumbnails(files: &[FileEntry], config: &ThumbnailConfig) -> HashSet<PathBuf> {
    if config.thumbnail_part.is_empty() {
        return HashSet::new();
    }

    let existing: HashSet<(&Path, String)> = files
        .iter()
        .map(|f| (f.directory.as_path(), f.file_name()))
        .collect();

    files
        .iter()
        .filter(|f| {
            let name = f.file_name();
            let original = name.replace(&config.thumbnail_part, &config.original_part);
            original != name && existing.contains(&(f.directory.as_path(), original))
        })
        .map(|f| f.path.clone())
        .collect()
}

/// Hash every file. Files that cannot be read keep no fingerprint and are
/// left out of duplicate detection.
pub fn fingerprint_all(files: Vec<FileEntry>) -> (Vec<FileEntry>, Vec<SortError>) {
    let hashed: Vec<(FileEntry, Option<SortError>)> = files
        .into_par_iter()
        .map(|file| match backup_sorter_core::hash_file(&file.path) {
            Ok(hash) => (
                FileEntry {
                    fingerprint: Some(hash),
                    ..file
                },
                None,
            ),
            Err(source) => {
                let issue = SortError::Hash {
                    path: file.path.clone(),
                    source,
                };
                (file, Some(issue))
            }
        })
        .collect();

    hashed
        .into_iter()
        .fold((Vec::new(), Vec::new()), |(mut files, mut issues), (file, issue)| {
            files.push(file);
            issues.extend(issue);
            (files, issues)
        })
}

/// Survivor first: lowest disambiguation suffix, then name, then path.
pub fn survivor_order(a: &FileEntry, b: &FileEntry) -> Ordering {
    a.rank.cmp(&b.rank).then_with(|| a.path.cmp(&b.path))
}

fn group_by<'a, K, F>(files: &'a [FileEntry], key: F) -> Vec<Vec<&'a FileEntry>>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a FileEntry) -> Option<K>,
{
    let mut groups: Vec<Vec<&FileEntry>> = files
        .iter()
        .filter_map(|file| key(file).map(|k| (k, file)))
        .fold(HashMap::<K, Vec<&FileEntry>>::new(), |mut acc, (k, file)| {
            acc.entry(k).or_default().push(file);
            acc
        })
        .into_values()
        .filter(|group| group.len() > 1)
        .collect();

    groups
        .iter_mut()
        .for_each(|group| group.sort_by(|a, b| survivor_order(a, b)));
    groups.sort_by(|a, b| a[0].path.cmp(&b[0].path));
    groups
}

/// Identical content within one folder.
pub fn find_folder_duplicates(files: &[FileEntry]) -> Vec<Vec<&FileEntry>> {
    group_by(files, |file| {
        file.fingerprint
            .as_deref()
            .map(|hash| (file.directory.as_path(), hash))
    })
}

/// Identical content anywhere in the archive.
pub fn find_duplicates(files: &[FileEntry]) -> Vec<Vec<&FileEntry>> {
    group_by(files, |file| file.fingerprint.as_deref())
}

/// One path per line, a blank line between groups.
pub fn render_manifest(groups: &[Vec<&FileEntry>], root: &Path) -> String {
    groups
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|file| {
                    let shown = file.path.strip_prefix(root).unwrap_or(&file.path);
                    format!("{}\n", shown.display())
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
