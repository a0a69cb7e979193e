use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use backup_sorter_core::{
    format_timestamp, match_identity, match_timestamp, replace_parts, sanitize, tokenize,
    IdentityIndex, Substitution, TimestampIndex,
};

use crate::config::Config;
use crate::report::SortError;
use crate::scanner::{file_name, FileEntry};
use crate::sniff::TypeSniffer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub folder: PathBuf,
    pub name: String,
    pub extension: String,
    /// Message time, when the file was matched to one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Destination {
    /// Path with the numeric disambiguator appended for `suffix > 0`.
    pub fn path_with_suffix(&self, suffix: u32) -> PathBuf {
        self.folder.join(self.file_name_with_suffix(suffix))
    }

    pub fn file_name_with_suffix(&self, suffix: u32) -> String {
        match suffix {
            0 => file_name(&self.name, &self.extension),
            n => file_name(&format!("{}_{}", self.name, n), &self.extension),
        }
    }
}

#[derive(Debug)]
pub struct Resolution {
    pub destination: Destination,
    pub issues: Vec<SortError>,
}

/// Derives where a file belongs and what it should be called.
pub struct NamingPolicy<'a> {
    config: &'a Config,
    root: &'a Path,
    identities: &'a IdentityIndex,
    timestamps: &'a TimestampIndex,
    /// Identity key to the folder of its conversation table.
    conversation_folders: &'a HashMap<String, String>,
    sniffer: &'a dyn TypeSniffer,
}

impl<'a> NamingPolicy<'a> {
    pub fn new(
        config: &'a Config,
        root: &'a Path,
        identities: &'a IdentityIndex,
        timestamps: &'a TimestampIndex,
        conversation_folders: &'a HashMap<String, String>,
        sniffer: &'a dyn TypeSniffer,
    ) -> Self {
        Self {
            config,
            root,
            identities,
            timestamps,
            conversation_folders,
            sniffer,
        }
    }

    pub fn substitution(&self) -> Substitution<'a> {
        substitution(self.config, self.identities)
    }

    pub fn resolve(&self, file: &FileEntry) -> Resolution {
        let in_place = Destination {
            folder: file.directory.clone(),
            name: file.working_name.clone(),
            extension: file.extension.clone(),
            timestamp: None,
        };

        if file.thumbnail_marked || self.config.is_passthrough(&file.extension) {
            return Resolution {
                destination: in_place,
                issues: Vec::new(),
            };
        }

        let mut issues = Vec::new();
        let sniffed = match self.config.is_reserved(&file.base_name, &file.extension) {
            true => Some(file.extension.clone()),
            false => self.sniffer.sniff(&file.path),
        };

        let tokens = tokenize(&file.working_name);
        let mut folder = in_place.folder;
        let mut consumed: Vec<String> = Vec::new();
        let mut extension_hint = None;
        let mut prefix = None;
        let mut timestamp = None;

        if let Some(found) = match_timestamp(&tokens, self.timestamps) {
            if !found.ignored.is_empty() {
                issues.push(SortError::AmbiguousUid {
                    path: file.path.clone(),
                    used: found.token.clone(),
                    ignored: found.ignored.clone(),
                });
            }
            folder = self.root.join(&found.entry.folder);
            extension_hint = found.entry.inferred_extension.clone();
            prefix = Some(sanitize(&format_timestamp(
                &found.entry.timestamp,
                &self.config.timestamp_format,
                self.config.use_utc,
            )));
            timestamp = Some(found.entry.timestamp);
            consumed.push(found.token);
        }

        if let Some(found) = match_identity(&tokens, self.identities) {
            if let Some(conversation) = self.conversation_folders.get(&found.identity.key) {
                folder = self.root.join(conversation);
                consumed.push(found.token);
            }
        }

        let remainder = tokens
            .iter()
            .filter(|t| !consumed.iter().any(|c| c == *t))
            .copied()
            .collect::<Vec<_>>()
            .join("_");
        let remainder = match &prefix {
            Some(p) if !p.is_empty() => remainder.replace(p.as_str(), ""),
            _ => remainder,
        };
        let rest = replace_parts(&tokenize(&remainder), &self.substitution());

        let name = match (prefix, rest.is_empty()) {
            (Some(p), true) => p,
            (Some(p), false) => format!("{}_{}", p, rest),
            (None, false) => rest,
            (None, true) => fallback_name(&file.working_name),
        };

        let extension = sniffed.or(extension_hint).unwrap_or_else(|| {
            issues.push(SortError::TypeUndetermined {
                path: file.path.clone(),
            });
            file.extension.clone()
        });

        Resolution {
            destination: Destination {
                folder,
                name,
                extension,
                timestamp,
            },
            issues,
        }
    }
}

pub fn substitution<'a>(config: &'a Config, identities: &'a IdentityIndex) -> Substitution<'a> {
    Substitution {
        identities: config.substitute_identities.then_some(identities),
        parts: config
            .substitute_parts
            .then_some(&config.part_replacements),
    }
}

fn fallback_name(original: &str) -> String {
    match sanitize(original) {
        name if name.is_empty() => "unnamed".to_string(),
        name => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_sorter_core::{from_epoch_millis, Row, TimestampEntry};
    use std::fs;
    use tempfile::TempDir;

    struct FixedSniffer(Option<&'static str>);

    impl TypeSniffer for FixedSniffer {
        fn sniff(&self, _path: &Path) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
        identities: IdentityIndex,
        timestamps: TimestampIndex,
        folders: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            let contact: Row = [
                ("lastname", "Muster"),
                ("firstname", "Max"),
                ("identity", "ABCD1234"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
            let (identities, _) = IdentityIndex::build(&[contact], &[]);

            let mut timestamps = TimestampIndex::new();
            timestamps
                .insert(
                    "uid001",
                    TimestampEntry {
                        timestamp: from_epoch_millis("1650000000000").unwrap(),
                        folder: "Muster Max ABCD1234".to_string(),
                        inferred_extension: Some("jpeg".to_string()),
                    },
                )
                .unwrap();

            let folders = HashMap::from([(
                "ABCD1234".to_string(),
                "Muster Max ABCD1234".to_string(),
            )]);

            Self {
                dir: TempDir::new().unwrap(),
                config: Config {
                    use_utc: true,
                    ..Config::default()
                },
                identities,
                timestamps,
                folders,
            }
        }

        fn file(&self, name: &str) -> FileEntry {
            let path = self.dir.path().join(name);
            fs::write(&path, b"content").unwrap();
            FileEntry::from_path(&path).unwrap()
        }

        fn resolve(&self, file: &FileEntry, sniffed: Option<&'static str>) -> Resolution {
            let sniffer = FixedSniffer(sniffed);
            let policy = NamingPolicy::new(
                &self.config,
                self.dir.path(),
                &self.identities,
                &self.timestamps,
                &self.folders,
                &sniffer,
            );
            policy.resolve(file)
        }
    }

    #[test]
    fn matched_file_gets_prefix_and_conversation_folder() {
        let fx = Fixture::new();
        let file = fx.file("message_media_uid001_ABCD1234");

        let resolution = fx.resolve(&file, Some("jpg"));
        let dest = resolution.destination;

        assert_eq!(dest.folder, fx.dir.path().join("Muster Max ABCD1234"));
        assert_eq!(dest.name, "2022-04-15_05-20-00");
        assert_eq!(dest.extension, "jpg");
        assert!(dest.timestamp.is_some());
        assert!(resolution.issues.is_empty());
    }

    #[test]
    fn second_uid_token_is_an_anomaly() {
        let mut fx = Fixture::new();
        fx.timestamps
            .insert(
                "uid002",
                TimestampEntry {
                    timestamp: from_epoch_millis("1650000060000").unwrap(),
                    folder: "elsewhere".to_string(),
                    inferred_extension: None,
                },
            )
            .unwrap();
        let file = fx.file("uid001_uid002");

        let resolution = fx.resolve(&file, Some("jpg"));

        assert_eq!(
            resolution.destination.folder,
            fx.dir.path().join("Muster Max ABCD1234")
        );
        match resolution.issues.as_slice() {
            [issue @ SortError::AmbiguousUid { used, ignored, .. }] => {
                assert_eq!(used, "uid001");
                assert_eq!(ignored, &vec!["uid002".to_string()]);
                assert!(issue.is_integrity_anomaly());
            }
            other => panic!("unexpected issues: {:?}", other),
        }
    }

    #[test]
    fn extension_hint_used_when_sniffing_fails() {
        let fx = Fixture::new();
        let file = fx.file("uid001");

        let resolution = fx.resolve(&file, None);

        assert_eq!(resolution.destination.extension, "jpeg");
        assert!(resolution.issues.is_empty());
    }

    #[test]
    fn existing_prefix_is_not_repeated() {
        let fx = Fixture::new();
        let file = fx.file("2022-04-15_05-20-00_uid001_beach");

        let dest = fx.resolve(&file, Some("jpg")).destination;

        assert_eq!(dest.name, "2022-04-15_05-20-00_beach");
    }

    #[test]
    fn uncorrelated_file_is_kept_with_original_extension() {
        let fx = Fixture::new();
        let file = fx.file("random_blob.bin");

        let resolution = fx.resolve(&file, None);

        assert_eq!(resolution.destination.folder, fx.dir.path());
        assert_eq!(resolution.destination.name, "random_blob");
        assert_eq!(resolution.destination.extension, "bin");
        assert!(matches!(
            resolution.issues.as_slice(),
            [SortError::TypeUndetermined { .. }]
        ));
    }

    #[test]
    fn passthrough_tables_stay_untouched() {
        let fx = Fixture::new();
        let file = fx.file("message_ABCD1234.csv");

        let dest = fx.resolve(&file, Some("zip")).destination;

        assert_eq!(dest.folder, fx.dir.path());
        assert_eq!(dest.name, "message_ABCD1234");
        assert_eq!(dest.extension, "csv");
    }

    #[test]
    fn identity_without_conversation_is_substituted_in_place() {
        let mut fx = Fixture::new();
        fx.folders.clear();
        let file = fx.file("profile_ABCD1234");

        let dest = fx.resolve(&file, Some("png")).destination;

        assert_eq!(dest.folder, fx.dir.path());
        assert_eq!(dest.name, "profile_Muster Max ABCD1234");
    }

    #[test]
    fn reserved_files_keep_their_extension_without_sniffing() {
        let fx = Fixture::new();
        let file = fx.file("settings");

        let resolution = fx.resolve(&file, Some("zip"));

        assert_eq!(resolution.destination.extension, "");
        assert!(resolution.issues.is_empty());
    }

    #[test]
    fn suffix_goes_before_extension() {
        let dest = Destination {
            folder: PathBuf::from("/a"),
            name: "photo".to_string(),
            extension: "jpg".to_string(),
            timestamp: None,
        };
        assert_eq!(dest.path_with_suffix(0), PathBuf::from("/a/photo.jpg"));
        assert_eq!(dest.path_with_suffix(2), PathBuf::from("/a/photo_2.jpg"));
    }
}
