pub mod config;
pub mod conversation;
pub mod dedup;
pub mod logging;
pub mod naming;
pub mod organizer;
pub mod report;
pub mod scanner;
pub mod sniff;
pub mod table;

pub use config::{Config, ThumbnailConfig};
pub use conversation::{
    conversation_folders, group_transcripts, table_kind, write_transcripts, ConversationTable,
    MessageRecord, TableKind, TranscriptLine,
};
pub use dedup::{
    find_duplicates, find_folder_duplicates, find_thumbnails, fingerprint_all, render_manifest,
};
pub use naming::{Destination, NamingPolicy, Resolution};
pub use organizer::Organizer;
pub use report::{RunReport, SortError, Stage, StageReport};
pub use scanner::{scan_directory, FileEntry, ScanOptions};
pub use sniff::{detect_by_magic, MagicSniffer, TypeSniffer};
pub use table::{parse_table, read_table, TableError};
