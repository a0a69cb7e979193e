use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static ILLEGAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

/// Make a name safe for common host file systems. Whitespace runs, tabs and
/// newlines included, become one space before illegal characters are replaced.
pub fn sanitize(name: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(name, " ");
    ILLEGAL_RE.replace_all(collapsed.trim(), "_").into_owned()
}

/// Join name parts with `_` and tidy the result: repeated separators collapse,
/// leading/trailing separators and trailing dots are removed.
pub fn join_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("_");
    let collapsed = SEPARATOR_RE.replace_all(&joined, "_");
    let trimmed = collapsed
        .trim_matches('_')
        .trim_end_matches('.')
        .trim_end_matches('_');
    sanitize(trimmed)
}

/// Whitespace-split every part and join the distinct words with a single
/// space. Duplicates are detected case-insensitively; the first spelling wins.
pub fn unique_word_join<S: AsRef<str>>(parts: &[S]) -> String {
    let mut seen = HashSet::new();
    parts
        .iter()
        .flat_map(|p| p.as_ref().split_whitespace())
        .filter(|word| seen.insert(word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_illegal_chars() {
        assert_eq!(sanitize("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize("  Max   Muster \t"), "Max Muster");
    }

    #[test]
    fn control_whitespace_collapses_to_space() {
        assert_eq!(sanitize("Team\tA"), "Team A");
        assert_eq!(sanitize("line\r\nbreak"), "line break");
        assert_eq!(sanitize("bell\x07"), "bell_");
    }

    #[test]
    fn join_collapses_separators() {
        assert_eq!(join_parts(&["", "photo", "", "2022"]), "photo_2022");
        assert_eq!(join_parts(&["name..", ""]), "name");
        assert_eq!(join_parts::<&str>(&[]), "");
    }

    #[test]
    fn unique_join_drops_empty_and_repeated_words() {
        assert_eq!(
            unique_word_join(&["Muster", "Max", "", "ABCD1234"]),
            "Muster Max ABCD1234"
        );
        assert_eq!(unique_word_join(&["Max", "max", "MAX"]), "Max");
        assert_eq!(unique_word_join(&["Anna Lena", "lena"]), "Anna Lena");
    }
}
