//! DBLP collaborator traits and implementations.

pub mod dblp;
pub mod mock;

use std::future::Future;
use std::pin::Pin;

pub use dblp::DblpOnline;

use crate::rate_limit::DbQueryError;

/// Substring DBLP puts in the body of a missing record.
pub const NOT_FOUND_MARKER: &str = "not found";

/// A single publication hit returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    /// Record path relative to `https://dblp.org/rec/`, e.g. `journals/corr/abs-2007-02423`.
    pub record_id: String,
}

/// A backend that can search publications by free-text query.
pub trait SearchBackend: Send + Sync {
    /// The canonical name of this backend (e.g., "DBLP").
    fn name(&self) -> &str;

    /// Return at most `hits` hits for `query`, in the backend's ranking order.
    fn search<'a>(
        &'a self,
        query: &'a str,
        hits: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, DbQueryError>> + Send + 'a>>;
}

/// A backend that serves the raw BibTeX text of a record.
pub trait RecordFetcher: Send + Sync {
    /// Fetch the BibTeX for `record_id`. A missing record is reported inside
    /// the returned text ("not found"), not as an error.
    fn fetch_bib<'a>(
        &'a self,
        record_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DbQueryError>> + Send + 'a>>;
}
