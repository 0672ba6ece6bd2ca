use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use dblpbib_core::config_file::load_config;
use dblpbib_core::{Config, DblpOnline, ProgressEvent, SearchBackend, Selection, hit_line};

mod output;

use output::ColorMode;

/// DBLP BibTeX fetcher - look up publication titles on DBLP and record
/// their BibTeX with normalized citation keys
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up every title and append one row per title to the CSV store
    Run {
        /// File with one title per line (default: config file, then built-in list)
        #[arg(long)]
        titles: Option<PathBuf>,

        /// CSV store to append to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of search hits requested per title
        #[arg(long)]
        hits: Option<usize>,

        /// Seconds to wait after each DBLP call
        #[arg(long, value_parser = parse_interval)]
        interval_secs: Option<Duration>,

        /// Pacing strategy: sleep, gate or none
        #[arg(long)]
        pacing: Option<String>,

        /// Fetch every hit and keep the most recently updated record
        #[arg(long)]
        latest: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Search DBLP and print the matching hit lines
    Search {
        /// Free-text query
        #[arg(required = true)]
        query: Vec<String>,

        /// Number of hits to show
        #[arg(long)]
        hits: Option<usize>,
    },

    /// Fetch and normalize the record behind a hit line, e.g. "Title (journals/x/Y20)"
    Get {
        /// A line as printed by `search`
        line: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = base_config()?;

    match cli.command {
        Command::Run {
            titles,
            output,
            hits,
            interval_secs,
            pacing,
            latest,
            no_color,
        } => {
            let mut config = config;
            if let Some(path) = titles {
                config.titles = read_titles(&path)?;
            }
            if let Some(path) = output {
                config.output_path = path;
            }
            if let Some(hits) = hits {
                config.hits = hits;
            }
            if let Some(pause) = interval_secs {
                config.pause = pause;
            }
            if let Some(mode) = pacing {
                config.pacing = mode.parse()?;
            }
            if latest {
                config.selection = Selection::Latest;
            }
            run(config, ColorMode(!no_color)).await
        }
        Command::Search { query, hits } => search(&config, &query.join(" "), hits).await,
        Command::Get { line } => get(&config, &line).await,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: env vars > config file > defaults.
fn base_config() -> anyhow::Result<Config> {
    let mut config = Config::default().with_file(&load_config())?;
    if let Ok(url) = std::env::var("DBLP_BASE_URL") {
        config.base_url = url;
    }
    if let Some(secs) = std::env::var("DBLP_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.timeout_secs = secs;
    }
    Ok(config)
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.trim().parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid interval {secs}: {e}"))
}

fn read_titles(path: &Path) -> anyhow::Result<Vec<String>> {
    if !path.exists() {
        anyhow::bail!("Titles file not found: {}", path.display());
    }
    let titles: Vec<String> = std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if titles.is_empty() {
        anyhow::bail!("No titles in {}", path.display());
    }
    Ok(titles)
}

fn online(config: &Config) -> anyhow::Result<DblpOnline> {
    Ok(DblpOnline::new(
        &config.base_url,
        Duration::from_secs(config.timeout_secs),
    )?)
}

async fn run(config: Config, color: ColorMode) -> anyhow::Result<()> {
    tracing::info!(
        titles = config.titles.len(),
        output = %config.output_path.display(),
        "starting batch"
    );

    let progress = move |event: ProgressEvent| {
        let mut out = std::io::stdout().lock();
        let _ = output::print_progress(&mut out, &event, color);
        let _ = out.flush();
    };

    let stats = dblpbib_core::run_batch(&config, progress).await?;

    let mut out = std::io::stdout().lock();
    output::print_summary(&mut out, &stats, &config.output_path, color)?;
    Ok(())
}

async fn search(config: &Config, query: &str, hits: Option<usize>) -> anyhow::Result<()> {
    let dblp = online(config)?;
    let found = dblp.search(query, hits.unwrap_or(config.hits)).await?;
    if found.is_empty() {
        println!("No results found in DBLP");
    }
    for hit in &found {
        println!("{}", hit_line(hit));
    }
    Ok(())
}

async fn get(config: &Config, line: &str) -> anyhow::Result<()> {
    let dblp = online(config)?;
    let entry = dblpbib_core::resolve_entry(line.trim(), &dblp).await?;
    println!("{}", entry);
    Ok(())
}
