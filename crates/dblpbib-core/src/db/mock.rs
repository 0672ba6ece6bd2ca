//! Mock DBLP backend and pacer for testing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{RecordFetcher, SearchBackend, SearchHit};
use crate::rate_limit::{DbQueryError, Pacer};

/// Body DBLP-like services answer with for an unknown record.
pub const NOT_FOUND_BODY: &str = "Error 404: not found";

/// A configurable mock response for [`MockDblp`].
#[derive(Clone, Debug)]
pub enum MockResponse<T> {
    Ok(T),
    Error(String),
}

/// A hand-rolled mock implementing [`SearchBackend`] and [`RecordFetcher`].
///
/// Queries without a configured response return no hits; record ids without
/// a configured response return [`NOT_FOUND_BODY`]. Every call is recorded.
#[derive(Default)]
pub struct MockDblp {
    searches: HashMap<String, MockResponse<Vec<SearchHit>>>,
    records: HashMap<String, MockResponse<String>>,
    search_log: Mutex<Vec<(String, usize)>>,
    fetch_log: Mutex<Vec<String>>,
}

impl MockDblp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with the given `(title, record id)` hits.
    pub fn with_hits(mut self, query: &str, hits: &[(&str, &str)]) -> Self {
        let hits = hits
            .iter()
            .map(|(title, id)| SearchHit {
                title: title.to_string(),
                record_id: id.to_string(),
            })
            .collect();
        self.searches
            .insert(query.to_string(), MockResponse::Ok(hits));
        self
    }

    /// Fail the search for `query`.
    pub fn with_search_error(mut self, query: &str, msg: &str) -> Self {
        self.searches
            .insert(query.to_string(), MockResponse::Error(msg.to_string()));
        self
    }

    /// Serve `body` for `record_id`.
    pub fn with_record(mut self, record_id: &str, body: &str) -> Self {
        self.records
            .insert(record_id.to_string(), MockResponse::Ok(body.to_string()));
        self
    }

    /// Fail the fetch of `record_id`.
    pub fn with_fetch_error(mut self, record_id: &str, msg: &str) -> Self {
        self.records
            .insert(record_id.to_string(), MockResponse::Error(msg.to_string()));
        self
    }

    /// Queries searched so far, with the requested hit count.
    pub fn searches(&self) -> Vec<(String, usize)> {
        self.search_log.lock().unwrap().clone()
    }

    /// Record ids fetched so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetch_log.lock().unwrap().clone()
    }
}

impl SearchBackend for MockDblp {
    fn name(&self) -> &str {
        "MockDBLP"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        hits: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, DbQueryError>> + Send + 'a>> {
        self.search_log
            .lock()
            .unwrap()
            .push((query.to_string(), hits));
        let response = self.searches.get(query).cloned();

        Box::pin(async move {
            match response {
                Some(MockResponse::Ok(found)) => Ok(found.into_iter().take(hits).collect()),
                Some(MockResponse::Error(msg)) => Err(DbQueryError::Other(msg)),
                None => Ok(vec![]),
            }
        })
    }
}

impl RecordFetcher for MockDblp {
    fn fetch_bib<'a>(
        &'a self,
        record_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DbQueryError>> + Send + 'a>> {
        self.fetch_log.lock().unwrap().push(record_id.to_string());
        let response = self.records.get(record_id).cloned();

        Box::pin(async move {
            match response {
                Some(MockResponse::Ok(body)) => Ok(body),
                Some(MockResponse::Error(msg)) => Err(DbQueryError::Other(msg)),
                None => Ok(NOT_FOUND_BODY.to_string()),
            }
        })
    }
}

/// Pacer that returns immediately and counts how often it was asked to wait.
#[derive(Default)]
pub struct CountingPacer {
    count: AtomicUsize,
}

impl CountingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Pacer for CountingPacer {
    fn pause<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}
