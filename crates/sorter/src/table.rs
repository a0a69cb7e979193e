use backup_sorter_core::Row;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV header: {0}")]
    Csv(#[from] csv::Error),
}

/// Parse comma-separated, double-quoted text into rows keyed by header.
/// Returns no rows when any `required` column is missing; malformed records
/// are skipped.
pub fn parse_table(text: &str, required: &[&str]) -> Result<Vec<Row>, TableError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .quote(b'"')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if !required.iter().all(|r| headers.iter().any(|h| h == r)) {
        return Ok(Vec::new());
    }

    let rows = reader
        .records()
        .enumerate()
        .filter_map(|(i, record)| match record {
            Ok(record) => Some(
                headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect::<Row>(),
            ),
            Err(e) => {
                tracing::warn!("skipping malformed record {}: {}", i + 1, e);
                None
            }
        })
        .collect();

    Ok(rows)
}

pub fn read_table(path: &Path, required: &[&str]) -> Result<Vec<Row>, TableError> {
    let bytes = std::fs::read(path)?;
    parse_table(&String::from_utf8_lossy(&bytes), required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields() {
        let text = "uid,type,body\n1,text,\"hello, \"\"world\"\"\"\n2,image,\"line\nbreak\"\n";
        let rows = parse_table(text, &["uid", "type"]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["body"], "hello, \"world\"");
        assert_eq!(rows[1]["body"], "line\nbreak");
    }

    #[test]
    fn missing_required_header_yields_nothing() {
        let rows = parse_table("a,b\n1,2\n", &["uid"]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn short_records_keep_leading_columns() {
        let rows = parse_table("uid,type,body\n7,text\n", &["uid"]).unwrap();

        assert_eq!(rows[0]["uid"], "7");
        assert!(!rows[0].contains_key("body"));
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let rows = parse_table("\u{feff}identity,firstname\nABCD1234,Max\n", &["identity"]).unwrap();
        assert_eq!(rows[0]["identity"], "ABCD1234");
    }
}
