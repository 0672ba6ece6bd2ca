use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bibtex;
pub mod citekey;
pub mod config_file;
pub mod db;
pub mod driver;
pub mod rate_limit;
pub mod selector;
pub mod store;

// Re-export for convenience
pub use bibtex::{BibFields, extract_fields, replace_dblp_key, sort_by_timestamp};
pub use citekey::format_key;
pub use db::{DblpOnline, RecordFetcher, SearchBackend, SearchHit};
pub use driver::{RunOptions, lookup_title, resolve_entry, run};
pub use rate_limit::{DbQueryError, FixedDelay, GovernorGate, NoPacing, Pacer};
pub use selector::{extract_record_id, hit_line};
pub use store::{CsvStore, EntryStore, MemoryStore, StoreError};

/// Entry recorded when DBLP answers a record fetch with "not found".
pub const NOT_FOUND_ENTRY: &str = "Not found in DBLP";

/// Titles processed when neither the command line nor a config file names any.
pub const DEFAULT_TITLES: &[&str] = &[
    "Participation Is not a Design Fix for Machine Learning.",
    "Algorithmic Rural Road Planning in India: Constrained Capacities and Choices in Public Sector.",
    "The perils of embedded experiments.",
    "The Silence of the Subaltern Student.",
];

/// One row of the output store.
///
/// `entry` is `None` when the search returned no hits; it is persisted as an
/// empty field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub title: String,
    pub entry: Option<String>,
}

/// Summary statistics for a complete batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub recorded: usize,
    pub not_found: usize,
    pub no_hits: usize,
}

/// Progress events emitted while the batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        index: usize,
        total: usize,
        title: String,
    },
    /// Rendered hit lines returned by the search.
    Matches { lines: Vec<String> },
    NoResults,
    NothingFound { title: String },
    Recorded {
        index: usize,
        total: usize,
        row: OutputRow,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("DBLP query failed: {0}")]
    Query(#[from] DbQueryError),
    #[error("malformed BibTeX record: missing `{field}` field")]
    MalformedRecord { field: &'static str },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// How the driver spaces its calls to DBLP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    /// Sleep for the full interval after every call.
    #[default]
    Sleep,
    /// Governor gate: calls are spaced at least one interval apart.
    Gate,
    None,
}

impl FromStr for PacingMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sleep" => Ok(PacingMode::Sleep),
            "gate" => Ok(PacingMode::Gate),
            "none" => Ok(PacingMode::None),
            other => Err(CoreError::Config(format!("unknown pacing mode '{other}'"))),
        }
    }
}

/// Which search hit is turned into the recorded entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// The first hit DBLP ranks.
    #[default]
    First,
    /// Fetch every hit and keep the record with the newest `timestamp`.
    Latest,
}

impl FromStr for Selection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Selection::First),
            "latest" => Ok(Selection::Latest),
            other => Err(CoreError::Config(format!("unknown selection '{other}'"))),
        }
    }
}

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub hits: usize,
    pub pause: Duration,
    pub pacing: PacingMode,
    pub selection: Selection,
    pub timeout_secs: u64,
    pub output_path: PathBuf,
    pub titles: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: db::dblp::DEFAULT_BASE_URL.to_string(),
            hits: 3,
            pause: Duration::from_secs(5),
            pacing: PacingMode::Sleep,
            selection: Selection::First,
            timeout_secs: 30,
            output_path: PathBuf::from("bibtex_entries.csv"),
            titles: DEFAULT_TITLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Config {
    /// Apply the values present in a loaded config file over `self`.
    pub fn with_file(mut self, file: &config_file::ConfigFile) -> Result<Self, CoreError> {
        if let Some(dblp) = &file.dblp {
            if let Some(url) = &dblp.base_url {
                self.base_url = url.clone();
            }
            if let Some(secs) = dblp.timeout_secs {
                self.timeout_secs = secs;
            }
            if let Some(hits) = dblp.hits {
                self.hits = hits;
            }
        }
        if let Some(run) = &file.run {
            if let Some(secs) = run.pause_secs {
                self.pause = Duration::try_from_secs_f64(secs)
                    .map_err(|e| CoreError::Config(format!("invalid pause_secs {secs}: {e}")))?;
            }
            if let Some(mode) = &run.pacing {
                self.pacing = mode.parse()?;
            }
            if let Some(sel) = &run.selection {
                self.selection = sel.parse()?;
            }
            if let Some(path) = &run.output {
                self.output_path = PathBuf::from(path);
            }
            if let Some(titles) = &run.titles
                && !titles.is_empty()
            {
                self.titles = titles.clone();
            }
        }
        Ok(self)
    }

    /// Build the pacer this configuration asks for.
    pub fn build_pacer(&self) -> Result<Box<dyn Pacer>, CoreError> {
        rate_limit::build_pacer(self.pacing, self.pause)
    }

    /// Options handed to [`driver::run`].
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            hits: self.hits,
            selection: self.selection,
        }
    }
}

/// Fetch, normalize and record a DBLP entry for each title.
///
/// Convenience wrapper over [`driver::run`] that builds the online DBLP
/// client, the configured pacer and a CSV store at `config.output_path`.
pub async fn run_batch(
    config: &Config,
    progress: impl Fn(ProgressEvent),
) -> Result<RunStats, CoreError> {
    let dblp = DblpOnline::new(
        &config.base_url,
        Duration::from_secs(config.timeout_secs),
    )?;
    let pacer = config.build_pacer()?;
    let mut store = CsvStore::open(&config.output_path)?;
    driver::run(
        &config.titles,
        &config.run_options(),
        &dblp,
        &dblp,
        pacer.as_ref(),
        &mut store,
        progress,
    )
    .await
}
