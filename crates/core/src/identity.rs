use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::sanitize::{sanitize, unique_word_join};

/// One parsed CSV row: column name to value.
pub type Row = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Contact,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key: String,
    pub display_name: String,
    /// Group numeric id, or the personal id for contacts. Filenames sometimes
    /// carry only this part of a group key.
    pub secondary_id: String,
    pub kind: IdentityKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("{table} row {row}: missing field `{field}`")]
    MissingField {
        table: &'static str,
        row: usize,
        field: &'static str,
    },
    #[error("{table} row {row}: identity `{key}` already indexed")]
    DuplicateKey {
        table: &'static str,
        row: usize,
        key: String,
    },
}

/// Contacts and groups keyed by identity. Ordered so fallback scans are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    identities: BTreeMap<String, Identity>,
}

impl IdentityIndex {
    /// Build from contact and group rows. Malformed rows are skipped and
    /// returned alongside the index.
    pub fn build(contacts: &[Row], groups: &[Row]) -> (Self, Vec<RowError>) {
        let parsed = contacts
            .iter()
            .enumerate()
            .map(|(i, row)| contact_from_row(i, row))
            .chain(
                groups
                    .iter()
                    .enumerate()
                    .map(|(i, row)| group_from_row(i, row)),
            );

        parsed.fold(
            (Self::default(), Vec::new()),
            |(mut index, mut errors), result| {
                match result {
                    Ok((row, identity)) => {
                        if let Err(e) = index.insert(row, identity) {
                            tracing::debug!("rejected identity row: {}", e);
                            errors.push(e);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("rejected identity row: {}", e);
                        errors.push(e);
                    }
                }
                (index, errors)
            },
        )
    }

    fn insert(&mut self, row: usize, identity: Identity) -> Result<(), RowError> {
        if self.identities.contains_key(&identity.key) {
            return Err(RowError::DuplicateKey {
                table: table_name(identity.kind),
                row,
                key: identity.key,
            });
        }
        self.identities.insert(identity.key.clone(), identity);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Identity> {
        self.identities.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.identities.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

fn table_name(kind: IdentityKind) -> &'static str {
    match kind {
        IdentityKind::Contact => "contacts",
        IdentityKind::Group => "groups",
    }
}

fn field<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map(|v| v.trim()).unwrap_or("")
}

fn required<'a>(
    row: &'a Row,
    table: &'static str,
    index: usize,
    name: &'static str,
) -> Result<&'a str, RowError> {
    match field(row, name) {
        "" => Err(RowError::MissingField {
            table,
            row: index,
            field: name,
        }),
        value => Ok(value),
    }
}

fn contact_from_row(index: usize, row: &Row) -> Result<(usize, Identity), RowError> {
    let key = required(row, "contacts", index, "identity")?;
    Ok((
        index,
        Identity {
            key: key.to_string(),
            display_name: contact_display_name(row),
            secondary_id: key.to_string(),
            kind: IdentityKind::Contact,
        },
    ))
}

fn group_from_row(index: usize, row: &Row) -> Result<(usize, Identity), RowError> {
    let id = required(row, "groups", index, "id")?;
    let creator = required(row, "groups", index, "creator")?;
    let key = format!("{}-{}", id, creator);
    let display_name = match field(row, "groupname") {
        "" => sanitize(&key),
        name => sanitize(&format!("{} {}", name, id)),
    };

    Ok((
        index,
        Identity {
            key,
            display_name,
            secondary_id: id.to_string(),
            kind: IdentityKind::Group,
        },
    ))
}

/// Last name, first name, nickname and identity, each word once.
pub fn contact_display_name(row: &Row) -> String {
    let parts = ["lastname", "firstname", "nick_name", "identity"].map(|name| field(row, name));
    sanitize(&unique_word_join(&parts))
}
