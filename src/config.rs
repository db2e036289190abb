//! Analysis configuration.
//!
//! Every name list the analyst can load lives here and is passed explicitly
//! to the stage that needs it.

use crate::error::{MemtraceError, Result};
use crate::io::TraceLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entry points whose allocations are treated as noise by default.
pub const DEFAULT_ALLOW_LIST: &[&str] = &["printf", "vprintf"];

/// A set of function or module names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameSet(BTreeSet<String>);

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from whitespace-delimited tokens.
    pub fn from_text(text: &str) -> Self {
        Self(text.split_whitespace().map(str::to_string).collect())
    }

    /// Load a list file. The result replaces, never extends, any previous set.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let set = Self::from_text(&text);
        debug!(path = %path.display(), names = set.len(), "Loaded name list");
        Ok(set)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for NameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Allocation filter lists. `None` disables the corresponding stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Drop allocations whose stack contains any of these functions.
    pub allow: Option<NameSet>,
    /// Keep only allocations whose stack contains one of these functions.
    pub target: Option<NameSet>,
    /// Keep only allocations whose stack passes through one of these modules.
    pub module: Option<NameSet>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allow: Some(DEFAULT_ALLOW_LIST.iter().copied().collect()),
            target: None,
            module: None,
        }
    }
}

/// Function lists used to grade suspects of an overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Functions known not to corrupt memory; never reported.
    pub safe: NameSet,
    /// Functions known to be exploitable.
    pub vulnerable: NameSet,
}

/// Where output artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for candidate trace files.
    pub artifact_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("memtrace-out"),
        }
    }
}

/// Master configuration for an analysis session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub limits: TraceLimits,
    pub filters: FilterConfig,
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Decode a JSON configuration; missing sections keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MemtraceError::Config(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MemtraceError::Config(e.to_string()))
    }
}
