//! Append-only output stores.
//!
//! The CSV store reopens its file for every row and flushes before closing
//! it again, so an interrupted run leaves every earlier row intact and never
//! a partial one from the writer's side.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::OutputRow;

/// Column names written once at the top of an empty CSV store.
pub const HEADER: [&str; 2] = ["Title", "Entry"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for output rows. Rows are only ever appended.
pub trait EntryStore {
    fn append(&mut self, row: &OutputRow) -> Result<(), StoreError>;
}

/// Two-column CSV file (`Title,Entry`) opened in append mode per row.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

fn csv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(file)
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl CsvStore {
    /// Open (creating if needed) the store at `path`. The header is written
    /// only if the file is empty.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = open_append(path)?;
        if file.metadata()?.len() == 0 {
            let mut writer = csv_writer(file);
            writer.write_record(HEADER)?;
            writer.flush()?;
            tracing::debug!(path = %path.display(), "created store with header");
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row back, header excluded. Empty entries read as `None`.
    pub fn read_rows(&self) -> Result<Vec<OutputRow>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(OutputRow {
                title: record.get(0).unwrap_or_default().to_string(),
                entry: record
                    .get(1)
                    .filter(|e| !e.is_empty())
                    .map(String::from),
            });
        }
        Ok(rows)
    }
}

impl EntryStore for CsvStore {
    fn append(&mut self, row: &OutputRow) -> Result<(), StoreError> {
        let mut writer = csv_writer(open_append(&self.path)?);
        writer.write_record([row.title.as_str(), row.entry.as_deref().unwrap_or("")])?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory store, mainly for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Vec<OutputRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }
}

impl EntryStore for MemoryStore {
    fn append(&mut self, row: &OutputRow) -> Result<(), StoreError> {
        self.rows.push(row.clone());
        Ok(())
    }
}
