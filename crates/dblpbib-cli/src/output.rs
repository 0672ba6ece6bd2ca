use std::io::Write;
use std::path::Path;

use dblpbib_core::{NOT_FOUND_ENTRY, ProgressEvent, RunStats};
use owo_colors::OwoColorize;

const SEPARATOR: &str = "----------------------------";

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Started {
            index,
            total,
            title,
        } => {
            writeln!(w, "{}", SEPARATOR)?;
            if color.enabled() {
                writeln!(
                    w,
                    "{} {}",
                    format!("[{}/{}]", index + 1, total).dimmed(),
                    title.bold()
                )?;
            } else {
                writeln!(w, "[{}/{}] {}", index + 1, total, title)?;
            }
        }
        ProgressEvent::Matches { lines } => {
            for line in lines {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::NoResults => {
            if color.enabled() {
                writeln!(w, "{}", "No results found in DBLP".yellow())?;
            } else {
                writeln!(w, "No results found in DBLP")?;
            }
        }
        ProgressEvent::NothingFound { title } => {
            if color.enabled() {
                writeln!(w, "{} {}", "nothing found for".red(), title)?;
            } else {
                writeln!(w, "nothing found for {}", title)?;
            }
        }
        ProgressEvent::Recorded { row, .. } => {
            let saved = match row.entry.as_deref() {
                None => "(empty)".to_string(),
                Some(NOT_FOUND_ENTRY) => NOT_FOUND_ENTRY.to_string(),
                Some(entry) => entry.lines().next().unwrap_or_default().to_string(),
            };
            if color.enabled() {
                writeln!(w, "{}", format!("saved: {}", saved).dimmed())?;
            } else {
                writeln!(w, "saved: {}", saved)?;
            }
        }
    }
    Ok(())
}

/// Print the end-of-run summary.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &RunStats,
    store_path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "{}", SEPARATOR)?;
    let line = format!(
        "{} titles: {} recorded, {} not found in DBLP, {} without hits",
        stats.total, stats.recorded, stats.not_found, stats.no_hits
    );
    if color.enabled() {
        writeln!(w, "{}", line.bold())?;
    } else {
        writeln!(w, "{}", line)?;
    }
    writeln!(w, "Rows appended to {}", store_path.display())?;
    Ok(())
}
