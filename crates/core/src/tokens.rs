use std::collections::HashMap;

use crate::identity::{Identity, IdentityIndex};
use crate::sanitize::join_parts;
use crate::timestamps::{TimestampEntry, TimestampIndex};

pub fn tokenize(name: &str) -> Vec<&str> {
    name.split('_').filter(|t| !t.is_empty()).collect()
}

#[derive(Debug, Clone)]
pub struct TimestampMatch<'i> {
    pub token: String,
    pub entry: &'i TimestampEntry,
    /// Further distinct uid tokens in the same name. Only the first is used.
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentityMatch<'i> {
    pub token: String,
    pub identity: &'i Identity,
    /// False when found through the secondary id fallback.
    pub exact: bool,
}

/// First token that is an indexed message uid.
pub fn match_timestamp<'i>(tokens: &[&str], index: &'i TimestampIndex) -> Option<TimestampMatch<'i>> {
    let mut hits = tokens.iter().copied().filter(|t| index.contains(t));
    let token = hits.next()?;
    let entry = index.get(token)?;

    let ignored = hits.fold(Vec::<String>::new(), |mut acc, t| {
        if t != token && !acc.iter().any(|seen| seen == t) {
            acc.push(t.to_string());
        }
        acc
    });

    Some(TimestampMatch {
        token: token.to_string(),
        entry,
        ignored,
    })
}

/// Exact key match in token order, falling back to the secondary id of
/// every identity.
pub fn match_identity<'i>(tokens: &[&str], index: &'i IdentityIndex) -> Option<IdentityMatch<'i>> {
    let exact = tokens.iter().find_map(|t| {
        index.get(t).map(|identity| IdentityMatch {
            token: t.to_string(),
            identity,
            exact: true,
        })
    });

    exact.or_else(|| {
        tokens.iter().find_map(|t| {
            index
                .iter()
                .find(|identity| matches_secondary(t, &identity.secondary_id))
                .map(|identity| IdentityMatch {
                    token: t.to_string(),
                    identity,
                    exact: false,
                })
        })
    })
}

fn matches_secondary(token: &str, secondary: &str) -> bool {
    !secondary.is_empty()
        && (token == secondary || token.split('-').next() == Some(secondary))
}

/// Which substitutions `replace_parts` applies. `None` disables a source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitution<'a> {
    pub identities: Option<&'a IdentityIndex>,
    pub parts: Option<&'a HashMap<String, String>>,
}

impl<'a> Substitution<'a> {
    fn replace(&self, token: &'a str) -> &'a str {
        self.identities
            .and_then(|index| index.get(token))
            .map(|identity| identity.display_name.as_str())
            .or_else(|| {
                self.parts
                    .and_then(|parts| parts.get(token))
                    .map(String::as_str)
            })
            .unwrap_or(token)
    }
}

/// Substitute identity tokens by display name and configured parts by their
/// replacement, then re-join into a sanitized name.
pub fn replace_parts(tokens: &[&str], substitution: &Substitution<'_>) -> String {
    let replaced: Vec<&str> = tokens.iter().map(|t| substitution.replace(t)).collect();
    join_parts(&replaced)
}
