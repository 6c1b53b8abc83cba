//! The per-student declarative file.

use crate::error::{SpliceError, SpliceResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Contents of the student file.
///
/// ```yaml
/// checkpoint: mid
/// useProvided: true
/// segments:
///   seg1: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentConfig {
    /// Selected checkpoint.
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Whether provided code is used at all.
    pub use_provided: bool,
    /// Explicit segment switches; takes precedence over `checkpoint`.
    #[serde(default)]
    pub segments: Option<BTreeMap<String, bool>>,
}

impl StudentConfig {
    /// Parses a student file; `path` is used in error messages.
    pub fn parse(text: &str, path: &Path) -> SpliceResult<Self> {
        serde_yaml::from_str(text).map_err(|e| SpliceError::StudentFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Reads and parses a student file.
    pub fn load(path: &Path) -> SpliceResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SpliceError::StudentFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&text, path)
    }
}
