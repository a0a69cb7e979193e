pub mod fingerprint;
pub mod identity;
pub mod sanitize;
pub mod timestamps;
pub mod tokens;

pub use fingerprint::{hash_content, hash_file};
pub use identity::{contact_display_name, Identity, IdentityIndex, IdentityKind, Row, RowError};
pub use sanitize::{join_parts, sanitize, unique_word_join};
pub use timestamps::{
    format_timestamp, from_epoch_millis, infer_extension, is_valid_format, DuplicateUid,
    TimestampEntry, TimestampIndex,
};
pub use tokens::{
    match_identity, match_timestamp, replace_parts, tokenize, IdentityMatch, Substitution,
    TimestampMatch,
};
