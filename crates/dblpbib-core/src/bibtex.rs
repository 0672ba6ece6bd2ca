//! Pattern-based field extraction and key rewriting for DBLP BibTeX records.
//!
//! DBLP serves one `@type{DBLP:<path>, name = {value}, ...}` entry per record.
//! Each field is matched with a single regex and returned verbatim, without
//! brace balancing.

use std::cmp::Reverse;

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::CoreError;

/// Author used for the key when a record names neither authors nor editors.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Format of the `timestamp` field DBLP stamps on every record.
const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

static AUTHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)author\s*=\s*\{(.*?)\}").unwrap());
static EDITOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)editor\s*=\s*\{(.*?)\}").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)title\s*=\s*\{(.*?)\}").unwrap());
// Single line only: `.` does not cross newlines here.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"year\s*=\s*\{(.*?)\}").unwrap());
static DBLP_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{DBLP:.*?,").unwrap());
static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"timestamp\s*=\s*\{([^}]+)\}").unwrap());

/// Fields needed to synthesize a citation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibFields {
    /// Author list, or editor list when the record has no authors.
    pub author: String,
    pub title: String,
    pub year: String,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Contents of the first `author = {...}` field.
pub fn extract_author(text: &str) -> Option<String> {
    capture(&AUTHOR_RE, text)
}

/// Contents of the first `editor = {...}` field.
pub fn extract_editor(text: &str) -> Option<String> {
    capture(&EDITOR_RE, text)
}

/// Contents of the first `title = {...}` field.
pub fn extract_title(text: &str) -> Option<String> {
    capture(&TITLE_RE, text)
}

/// Contents of the first single-line `year = {...}` field.
pub fn extract_year(text: &str) -> Option<String> {
    capture(&YEAR_RE, text)
}

/// Extract author (falling back to editor, then [`UNKNOWN_AUTHOR`]), title
/// and year from a raw record.
///
/// A record without a title or year is malformed.
pub fn extract_fields(text: &str) -> Result<BibFields, CoreError> {
    let author = extract_author(text)
        .or_else(|| extract_editor(text))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let title = extract_title(text).ok_or(CoreError::MalformedRecord { field: "title" })?;
    let year = extract_year(text).ok_or(CoreError::MalformedRecord { field: "year" })?;
    Ok(BibFields {
        author,
        title,
        year,
    })
}

/// Replace every `{DBLP:<path>,` entry key with `{<key>,`.
pub fn replace_dblp_key(text: &str, key: &str) -> String {
    let replacement = format!("{{{},", key);
    DBLP_KEY_RE
        .replace_all(text, NoExpand(&replacement))
        .into_owned()
}

/// Parse the `timestamp` field of a record, if present and well formed.
pub fn extract_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let raw = capture(&TIMESTAMP_RE, text)?;
    match DateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::warn!(timestamp = %raw, error = %e, "unparseable record timestamp");
            None
        }
    }
}

/// Sort records newest first by their `timestamp` field.
///
/// Records without a usable timestamp go last. The sort is stable, so ties
/// keep their input order.
pub fn sort_by_timestamp<S: AsRef<str>>(entries: &mut [S]) {
    entries.sort_by_cached_key(|e| Reverse(extract_timestamp(e.as_ref())));
}
