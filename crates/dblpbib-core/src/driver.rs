//! The batch loop: search each title, fetch and normalize the chosen record,
//! append one row per title.

use crate::bibtex::{extract_fields, replace_dblp_key, sort_by_timestamp};
use crate::citekey::format_key;
use crate::db::{NOT_FOUND_MARKER, RecordFetcher, SearchBackend};
use crate::rate_limit::Pacer;
use crate::selector::{extract_record_id, hit_line};
use crate::store::EntryStore;
use crate::{CoreError, NOT_FOUND_ENTRY, OutputRow, ProgressEvent, RunStats, Selection};

/// Per-run knobs of the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Hits requested per search.
    pub hits: usize,
    pub selection: Selection,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            hits: 3,
            selection: Selection::First,
        }
    }
}

/// Turn a fetched record into the recorded entry.
///
/// A body mentioning "not found" becomes [`NOT_FOUND_ENTRY`]. Otherwise the
/// DBLP key is replaced by a synthesized citation key and the text trimmed.
pub fn normalize_record(bib: &str) -> Result<String, CoreError> {
    if bib.contains(NOT_FOUND_MARKER) {
        return Ok(NOT_FOUND_ENTRY.to_string());
    }
    let fields = extract_fields(bib)?;
    let key = format_key(&fields.author, &fields.title, &fields.year);
    Ok(replace_dblp_key(bib, &key).trim().to_string())
}

/// Record id for a hit line. A line without one yields an empty id, which
/// makes the fetch ask for `rec/.bib`.
fn record_id_or_empty(line: &str) -> &str {
    extract_record_id(line).unwrap_or_else(|| {
        tracing::warn!(line, "no record id in hit line, fetching with an empty id");
        ""
    })
}

/// Fetch and normalize the record behind one rendered hit line.
pub async fn resolve_entry(line: &str, fetch: &dyn RecordFetcher) -> Result<String, CoreError> {
    let record_id = record_id_or_empty(line);
    let bib = fetch.fetch_bib(record_id).await?;
    normalize_record(&bib)
}

/// Fetch every hit, drop missing records and normalize the one with the
/// newest timestamp.
async fn resolve_latest(
    lines: &[String],
    fetch: &dyn RecordFetcher,
    pacer: &dyn Pacer,
) -> Result<String, CoreError> {
    let mut records = Vec::with_capacity(lines.len());
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let bib = fetch.fetch_bib(record_id_or_empty(line)).await?;
        pacer.pause().await;
        if bib.contains(NOT_FOUND_MARKER) {
            tracing::debug!(line, "candidate record not found");
            continue;
        }
        records.push(bib);
    }

    sort_by_timestamp(&mut records);
    match records.first() {
        Some(bib) => normalize_record(bib),
        None => Ok(NOT_FOUND_ENTRY.to_string()),
    }
}

/// Search one title and resolve its entry.
///
/// Returns `Ok(None)` when the search has no usable hit. Pauses once after
/// the search and once after each fetch.
pub async fn lookup_title(
    title: &str,
    options: &RunOptions,
    search: &dyn SearchBackend,
    fetch: &dyn RecordFetcher,
    pacer: &dyn Pacer,
    progress: &dyn Fn(ProgressEvent),
) -> Result<Option<String>, CoreError> {
    let hits = search.search(title, options.hits).await?;
    let lines: Vec<String> = hits.iter().map(hit_line).collect();
    tracing::debug!(backend = search.name(), title, hits = lines.len(), "search complete");

    if lines.is_empty() {
        progress(ProgressEvent::NoResults);
    } else {
        progress(ProgressEvent::Matches {
            lines: lines.clone(),
        });
    }

    pacer.pause().await;

    let Some(first) = lines.first().map(|l| l.trim()).filter(|l| !l.is_empty()) else {
        progress(ProgressEvent::NothingFound {
            title: title.to_string(),
        });
        return Ok(None);
    };

    let entry = match options.selection {
        Selection::First => {
            let entry = resolve_entry(first, fetch).await?;
            pacer.pause().await;
            entry
        }
        Selection::Latest => resolve_latest(&lines, fetch, pacer).await?,
    };
    Ok(Some(entry))
}

/// Run the batch over `titles`, appending exactly one row per title in order.
///
/// Query, malformed-record and store errors end the batch; rows appended
/// before the failure stay in the store.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    titles: &[String],
    options: &RunOptions,
    search: &dyn SearchBackend,
    fetch: &dyn RecordFetcher,
    pacer: &dyn Pacer,
    store: &mut dyn EntryStore,
    progress: impl Fn(ProgressEvent),
) -> Result<RunStats, CoreError> {
    let total = titles.len();
    let mut stats = RunStats {
        total,
        ..RunStats::default()
    };

    for (index, title) in titles.iter().enumerate() {
        progress(ProgressEvent::Started {
            index,
            total,
            title: title.clone(),
        });

        let entry = lookup_title(title, options, search, fetch, pacer, &progress).await?;
        match entry.as_deref() {
            None => stats.no_hits += 1,
            Some(NOT_FOUND_ENTRY) => stats.not_found += 1,
            Some(_) => stats.recorded += 1,
        }

        let row = OutputRow {
            title: title.clone(),
            entry,
        };
        store.append(&row)?;
        tracing::info!(title = %row.title, found = row.entry.is_some(), "row recorded");
        progress(ProgressEvent::Recorded { index, total, row });
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SearchHit;
    use crate::db::mock::{CountingPacer, MockDblp};
    use crate::rate_limit::{DbQueryError, GovernorGate};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    const BIB: &str = "@inproceedings{DBLP:conf/chi/DoeR20,\n  author = {Jane A. Doe and\n    Rick Roe},\n  title = {The Quick Brown Fox},\n  year = {2020},\n}\n";

    fn bib_with(key: &str, title: &str, timestamp: &str) -> String {
        format!(
            "@article{{DBLP:{key},\n  author = {{Ann Lee}},\n  title = {{{title}}},\n  year = {{2021}},\n  timestamp = {{{timestamp}}},\n}}"
        )
    }

    fn silent(_: ProgressEvent) {}

    #[test]
    fn normalize_rewrites_key_and_trims() {
        let out = normalize_record(BIB).unwrap();
        assert!(out.starts_with("@inproceedings{doeTheQuickBrown2020,\n"));
        assert!(out.ends_with('}'));
    }

    #[test]
    fn normalize_not_found_sentinel() {
        assert_eq!(
            normalize_record("<html>Error 404: not found</html>").unwrap(),
            NOT_FOUND_ENTRY
        );
    }

    #[test]
    fn normalize_missing_year_fails() {
        let err = normalize_record("@misc{DBLP:a/b/c,\n  title = {T},\n}").unwrap_err();
        assert!(matches!(err, CoreError::MalformedRecord { field: "year" }));
    }

    #[tokio::test]
    async fn resolve_entry_fetches_selected_id() {
        let db = MockDblp::new().with_record("conf/chi/DoeR20", BIB);
        let out = resolve_entry("The Quick Brown Fox. (conf/chi/DoeR20)", &db)
            .await
            .unwrap();
        assert!(out.starts_with("@inproceedings{doeTheQuickBrown2020,"));
        assert_eq!(db.fetches(), vec!["conf/chi/DoeR20".to_string()]);
    }

    #[tokio::test]
    async fn resolve_entry_without_id_fetches_empty_id() {
        let db = MockDblp::new();
        let out = resolve_entry("A title without a record path", &db)
            .await
            .unwrap();
        assert_eq!(db.fetches(), vec![String::new()]);
        assert_eq!(out, NOT_FOUND_ENTRY);
    }

    #[tokio::test]
    async fn lookup_pauses_after_search_and_fetch() {
        let db = MockDblp::new()
            .with_hits("Fox", &[("The Quick Brown Fox.", "conf/chi/DoeR20")])
            .with_record("conf/chi/DoeR20", BIB);
        let pacer = CountingPacer::new();
        let entry = lookup_title("Fox", &RunOptions::default(), &db, &db, &pacer, &silent)
            .await
            .unwrap();
        assert!(entry.unwrap().contains("doeTheQuickBrown2020"));
        assert_eq!(pacer.count(), 2);
        assert_eq!(db.searches(), vec![("Fox".to_string(), 3)]);
    }

    #[tokio::test]
    async fn lookup_without_hits_pauses_once() {
        let db = MockDblp::new();
        let pacer = CountingPacer::new();
        let entry = lookup_title("Nothing", &RunOptions::default(), &db, &db, &pacer, &silent)
            .await
            .unwrap();
        assert_eq!(entry, None);
        assert_eq!(pacer.count(), 1);
        assert!(db.fetches().is_empty());
    }

    #[tokio::test]
    async fn latest_selection_picks_newest_record() {
        let db = MockDblp::new()
            .with_hits(
                "Graphs",
                &[
                    ("Graphs (preprint).", "journals/corr/abs-2101-00001"),
                    ("Graphs.", "conf/icml/Lee21"),
                    ("Graphs (gone).", "conf/x/Gone21"),
                ],
            )
            .with_record(
                "journals/corr/abs-2101-00001",
                &bib_with("journals/corr/abs-2101-00001", "Old Graphs Preprint", "Mon, 04 Jan 2021 10:00:00 +0100"),
            )
            .with_record(
                "conf/icml/Lee21",
                &bib_with("conf/icml/Lee21", "Graphs At Scale", "Fri, 16 Jul 2021 12:00:00 +0200"),
            );
        let pacer = CountingPacer::new();
        let options = RunOptions {
            selection: Selection::Latest,
            ..RunOptions::default()
        };
        let entry = lookup_title("Graphs", &options, &db, &db, &pacer, &silent)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.starts_with("@article{leeGraphsAtScale2021,"), "{entry}");
        assert_eq!(db.fetches().len(), 3);
        // One pause after the search, one after each fetch.
        assert_eq!(pacer.count(), 4);
    }

    #[tokio::test]
    async fn latest_selection_all_missing_is_not_found() {
        let db = MockDblp::new().with_hits("Ghost", &[("Ghost.", "conf/x/Ghost20")]);
        let options = RunOptions {
            selection: Selection::Latest,
            ..RunOptions::default()
        };
        let entry = lookup_title("Ghost", &options, &db, &db, &CountingPacer::new(), &silent)
            .await
            .unwrap();
        assert_eq!(entry.as_deref(), Some(NOT_FOUND_ENTRY));
    }

    /// Records when each external call starts.
    struct TimedDblp {
        calls: Mutex<Vec<(&'static str, Instant)>>,
    }

    impl SearchBackend for TimedDblp {
        fn name(&self) -> &str {
            "TimedDBLP"
        }

        fn search<'a>(
            &'a self,
            _query: &'a str,
            _hits: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, DbQueryError>> + Send + 'a>>
        {
            self.calls.lock().unwrap().push(("search", Instant::now()));
            Box::pin(async {
                Ok(vec![SearchHit {
                    title: "The Quick Brown Fox.".into(),
                    record_id: "conf/chi/DoeR20".into(),
                }])
            })
        }
    }

    impl RecordFetcher for TimedDblp {
        fn fetch_bib<'a>(
            &'a self,
            _record_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, DbQueryError>> + Send + 'a>> {
            self.calls.lock().unwrap().push(("fetch", Instant::now()));
            Box::pin(async { Ok(BIB.to_string()) })
        }
    }

    #[tokio::test]
    async fn gate_spaces_search_and_first_fetch() {
        let interval = Duration::from_millis(200);
        let gate = GovernorGate::new(interval).unwrap();
        let db = TimedDblp {
            calls: Mutex::new(Vec::new()),
        };

        lookup_title("Fox", &RunOptions::default(), &db, &db, &gate, &silent)
            .await
            .unwrap();

        let calls = db.calls.into_inner().unwrap();
        assert_eq!(calls.len(), 2);
        let gap = calls[1].1 - calls[0].1;
        // Governor keeps its own clock; allow a millisecond of skew.
        assert!(gap + Duration::from_millis(1) >= interval, "search -> fetch gap {gap:?}");
    }
}
