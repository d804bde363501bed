//! Flat `Column Name,RSS Feed URL` import/export format.
//!
//! No quoting: column names cannot contain commas, and each row is split at
//! its first comma so URLs keep theirs.

use thiserror::Error;

use super::source::{FeedSource, FeedSourceError};

/// Required first line of every CSV file.
pub const CSV_HEADER: &str = "Column Name,RSS Feed URL";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Missing header, expected 'Column Name,RSS Feed URL'")]
    MissingHeader,

    #[error("Line {line}: expected header 'Column Name,RSS Feed URL', found '{found}'")]
    BadHeader { line: usize, found: String },

    #[error("Line {line}: expected '<column>,<feed url>'")]
    MissingSeparator { line: usize },

    #[error("Line {line}: column name is empty")]
    EmptyColumn { line: usize },

    #[error("Line {line}: {source}")]
    InvalidSource {
        line: usize,
        #[source]
        source: FeedSourceError,
    },
}

/// One `(column, source)` membership. `source` is `None` for the single row
/// that represents an empty column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub column: String,
    pub source: Option<FeedSource>,
}

/// Parses CSV text into rows.
///
/// Source URLs are unwrapped from any of `legacy_prefixes`, so files exported
/// by older relay-prefixed dashboards import cleanly. Blank lines are
/// skipped.
///
/// # Errors
///
/// The first bad line stops parsing. Line numbers are 1-based:
///
/// - [`CsvError::MissingHeader`] / [`CsvError::BadHeader`] - first line is
///   not `Column Name,RSS Feed URL`
/// - [`CsvError::MissingSeparator`] - a row without a comma
/// - [`CsvError::EmptyColumn`] - a row with a blank column name
/// - [`CsvError::InvalidSource`] - a non-empty URL that is not http(s)
pub fn parse_csv(text: &str, legacy_prefixes: &[String]) -> Result<Vec<CsvRow>, CsvError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines.next().ok_or(CsvError::MissingHeader)?;
    let header = header.trim_start_matches('\u{feff}');
    if !header.eq_ignore_ascii_case(CSV_HEADER) {
        return Err(CsvError::BadHeader {
            line: header_line,
            found: header.to_string(),
        });
    }

    let mut rows = Vec::new();
    for (line, content) in lines {
        let (column, url) = content
            .split_once(',')
            .ok_or(CsvError::MissingSeparator { line })?;
        let column = column.trim();
        if column.is_empty() {
            return Err(CsvError::EmptyColumn { line });
        }

        let url = url.trim();
        let source = if url.is_empty() {
            None
        } else {
            let source = FeedSource::parse_legacy(url, legacy_prefixes)
                .map_err(|source| CsvError::InvalidSource { line, source })?;
            Some(source)
        };

        rows.push(CsvRow {
            column: column.to_string(),
            source,
        });
    }

    tracing::debug!(rows = rows.len(), "Parsed CSV");
    Ok(rows)
}

/// Renders rows as CSV text, header first, one line per row.
pub fn write_csv(rows: &[CsvRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + rows.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.column);
        out.push(',');
        if let Some(source) = &row.source {
            out.push_str(source.as_str());
        }
        out.push('\n');
    }
    out
}
