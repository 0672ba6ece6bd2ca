use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub dblp: Option<DblpConfig>,
    pub run: Option<RunConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DblpConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub hits: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub output: Option<String>,
    pub pause_secs: Option<f64>,
    /// `sleep`, `gate` or `none`.
    pub pacing: Option<String>,
    /// `first` or `latest`.
    pub selection: Option<String>,
    pub titles: Option<Vec<String>>,
}

/// Platform config directory path: `<config_dir>/dblpbib/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dblpbib").join("config.toml"))
}

/// Load config by cascading CWD `.dblpbib.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".dblpbib.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_dblp = base.dblp.unwrap_or_default();
    let over_dblp = overlay.dblp.unwrap_or_default();
    let base_run = base.run.unwrap_or_default();
    let over_run = overlay.run.unwrap_or_default();

    ConfigFile {
        dblp: Some(DblpConfig {
            base_url: over_dblp.base_url.or(base_dblp.base_url),
            timeout_secs: over_dblp.timeout_secs.or(base_dblp.timeout_secs),
            hits: over_dblp.hits.or(base_dblp.hits),
        }),
        run: Some(RunConfig {
            output: over_run.output.or(base_run.output),
            pause_secs: over_run.pause_secs.or(base_run.pause_secs),
            pacing: over_run.pacing.or(base_run.pacing),
            selection: over_run.selection.or(base_run.selection),
            titles: over_run.titles.or(base_run.titles),
        }),
    }
}
