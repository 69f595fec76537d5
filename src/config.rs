//! Configuration: defaults → YAML file → `ZONEWATCH_*` env → CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::staleness::{StalenessPolicy, DEFAULT_MAX_LAG_SECS};

const ENV_PREFIX: &str = "ZONEWATCH_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File listing the nodes to check, one per line.
    pub node_file: PathBuf,
    /// Directory the collector writes `<node>.yaml` records into.
    pub results_directory: PathBuf,
    /// Zones every node is expected to serve.
    pub domains: Vec<String>,
    pub max_lag_secs: u64,
    /// Nodes checked concurrently; 1 keeps checks strictly sequential.
    pub jobs: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_file: PathBuf::from("nodes.txt"),
            results_directory: PathBuf::from("/tmp/dnsdata/"),
            domains: Vec::new(),
            max_lag_secs: DEFAULT_MAX_LAG_SECS,
            jobs: 1,
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Default config location: `~/.config/zonewatch/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("zonewatch").join("config.yaml"))
    }

    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.max_lag_secs)
    }
}

/// Load configuration from `path` (or the default location) layered with
/// the environment. A missing file is not an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

    match path {
        Some(path) => {
            anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        None => {
            if let Some(default) = Config::default_path() {
                figment = figment.merge(Yaml::file(default));
            }
        }
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract::<Config>()
        .context("loading zonewatch configuration")
}

/// Split a comma-separated zone list, dropping blanks.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the node list: one name per line, blank lines and `#` comments skipped.
pub fn read_node_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading node list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
