//! Output artifacts: trace subsets written to disk.
//!
//! Candidate files are grouped under a directory named after the bug-site
//! line, one file per candidate named by its hexadecimal address.

use super::overflow::OverflowReport;
use crate::error::Result;
use crate::tracer::RangeTrace;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension of every trace subset artifact.
pub const ARTIFACT_EXTENSION: &str = "trace";

/// Write a range trace to `path`, creating parent directories as needed.
pub fn write_range_trace(path: &Path, trace: &RangeTrace) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    trace.write_to(BufWriter::new(file))?;
    debug!(path = %path.display(), lines = trace.lines.len(), "Wrote trace artifact");
    Ok(())
}

/// Directory holding the candidate files of an analysis.
pub fn candidate_dir(root: &Path, bug_site_line: usize) -> PathBuf {
    root.join(bug_site_line.to_string())
}

/// File name of a candidate artifact.
pub fn candidate_file_name(address: u64) -> String {
    format!("{address:#x}.{ARTIFACT_EXTENSION}")
}

/// Write one file per candidate; returns the paths in candidate order.
pub fn write_candidate_artifacts(root: &Path, report: &OverflowReport) -> Result<Vec<PathBuf>> {
    let dir = candidate_dir(root, report.bug_site.line);
    fs::create_dir_all(&dir)?;
    report
        .candidates
        .iter()
        .map(|candidate| {
            let path = dir.join(candidate_file_name(candidate.address));
            write_range_trace(&path, &candidate.trace)?;
            Ok(path)
        })
        .collect()
}
