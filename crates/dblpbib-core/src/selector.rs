//! Rendering of search hits into `"<title> (<record id>)"` lines and
//! recovery of the record id from such a line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::SearchHit;

// The parenthesized suffix needs at least two slashes and must end the line.
static RECORD_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()]*/.*/[^()]*)\)$").unwrap());

/// Render a hit the way it is shown to the user and fed back to
/// [`extract_record_id`].
pub fn hit_line(hit: &SearchHit) -> String {
    format!("{} ({})", hit.title, hit.record_id)
}

/// Extract the DBLP record id from the trailing parenthesized suffix of a
/// rendered hit line. Returns `None` when the line has no such suffix.
pub fn extract_record_id(line: &str) -> Option<&str> {
    RECORD_ID_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
