//! Citation key synthesis: `<surname><Three><Title><Words><year>`.

/// Number of leading title words that go into a key.
const TITLE_WORDS: usize = 3;

/// Build a citation key from a BibTeX author list, title and year.
///
/// The surname is the last token of the first author (authors are separated
/// by `" and"`), lowercased. The first three title words are stripped down
/// to ASCII letters and concatenated with their case preserved. The year is
/// appended verbatim. Keys are deterministic but not unique.
pub fn format_key(author: &str, title: &str, year: &str) -> String {
    let first_author = author.split(" and").next().unwrap_or_default();
    let surname = first_author
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_lowercase();

    let fragment: String = title
        .split_whitespace()
        .take(TITLE_WORDS)
        .flat_map(|word| word.chars().filter(|c| c.is_ascii_alphabetic()))
        .collect();

    format!("{surname}{fragment}{year}")
}
