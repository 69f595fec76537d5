//! Node snapshot: the per-node result record written by the collector.
//!
//! The collector on each secondary writes `<node>.yaml` into the results
//! directory. zonewatch only ever reads these files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File extension of a node result record.
pub const RECORD_EXTENSION: &str = "yaml";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no result record at {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Recorded state of one node as written by the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(default)]
    pub nsid: Option<NsidRecord>,
    /// Zone entries are kept raw so one incomplete entry only affects its own zone.
    #[serde(default)]
    pub domains: Option<HashMap<String, serde_yaml::Value>>,
}

/// The NSID the node last answered with, and when it was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsidRecord {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub updated: Option<i64>,
}

/// Last observed SOA state of a single zone on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    #[serde(rename = "updated")]
    pub updated_at: i64,
    pub serial: u32,
}

impl NodeSnapshot {
    /// Load a snapshot from disk, distinguishing a missing file from a broken one.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit; treat it as a node with no data.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Claimed node identity, `None` when absent or blank.
    pub fn identity(&self) -> Option<&str> {
        self.nsid
            .as_ref()
            .and_then(|n| n.value.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// When the identity was last reported.
    pub fn identity_recorded_at(&self) -> Option<i64> {
        self.nsid.as_ref().and_then(|n| n.updated)
    }

    /// Recorded state of zone `name`, `None` when absent or incomplete.
    pub fn domain(&self, name: &str) -> Option<DomainRecord> {
        let entry = self.domains.as_ref()?.get(name)?;
        serde_yaml::from_value(entry.clone()).ok()
    }
}

/// Node name a record file is expected to belong to:
/// the file name without its record extension and trailing dots.
pub fn expected_node_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(RECORD_EXTENSION)
        .unwrap_or(&file_name);
    stem.trim_end_matches('.').to_string()
}

/// Path of a node's result record inside `results_directory`.
///
/// The node name is dot-terminated first, so `ns1` and `ns1.` both map to
/// `ns1.yaml`.
pub fn record_path(results_directory: &Path, node: &str) -> PathBuf {
    let mut qualified = node.trim().to_string();
    if !qualified.ends_with('.') {
        qualified.push('.');
    }
    results_directory.join(format!("{qualified}{RECORD_EXTENSION}"))
}
