//! Overflow impact analysis.
//!
//! Given an out-of-bounds write of known offset and length starting inside a
//! source allocation, find every allocation the write may reach, replay the
//! operations that touched each overlap, and grade the functions involved
//! against the analyst's safe and vulnerable lists.

use crate::config::ClassificationConfig;
use crate::error::{MemtraceError, Result};
use crate::io::TraceStore;
use crate::span_trace;
use crate::trace::{find_function_header, AllocationRecord, BugSite};
use crate::tracer::{trace_range, AddressInterval, RangeTrace};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// Bytes written by the overflow, `[start, end]` with an inclusive end.
///
/// The inclusive end is only used to decide which allocations *may* be hit,
/// so structures that merely touch the overflow boundary are still reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowInterval {
    pub start: u64,
    pub end: u64,
}

impl OverflowInterval {
    /// `start = source.address + offset`, `end = start + length`.
    ///
    /// A zero length is a boundary query: `[start, start]` still selects the
    /// allocations touching `start`, with nothing to trace in any of them.
    pub fn from_source(source: &AllocationRecord, offset: u64, length: u64) -> Result<Self> {
        let start = source.address.checked_add(offset).ok_or_else(|| {
            MemtraceError::InvalidInput(format!(
                "offset {offset:#x} overflows allocation at {:#x}",
                source.address
            ))
        })?;
        let end = start.checked_add(length).ok_or_else(|| {
            MemtraceError::InvalidInput(format!(
                "length {length:#x} overflows address space from {start:#x}"
            ))
        })?;
        Ok(Self { start, end })
    }

    /// Closed-interval test: excluded only when entirely before or after.
    pub fn may_overlap(&self, record: &AllocationRecord) -> bool {
        !(record.end() < self.start || record.address > self.end)
    }

    /// Bytes of `record` the overflow reaches, as a half-open range for tracing.
    pub fn intersection(&self, record: &AllocationRecord) -> AddressInterval {
        let start = record.address.max(self.start);
        let end = record.end().min(self.end).max(start);
        AddressInterval { start, end }
    }
}

impl fmt::Display for OverflowInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

/// How worried the analyst should be about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Only known-safe functions (or none) touched the overlap.
    Safe,
    /// At least one known-vulnerable function touched the overlap.
    Vulnerable,
    /// Only functions absent from both lists touched the overlap.
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => write!(f, "safe"),
            Verdict::Vulnerable => write!(f, "vulnerable"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

/// Suspect functions of a candidate, split by list membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Functions on the vulnerable list, first-touch order, no repeats.
    pub vulnerable: Vec<String>,
    /// Functions on neither list, first-touch order, no repeats.
    pub unknown: Vec<String>,
}

impl Classification {
    pub fn verdict(&self) -> Verdict {
        if !self.vulnerable.is_empty() {
            Verdict::Vulnerable
        } else if !self.unknown.is_empty() {
            Verdict::Unknown
        } else {
            Verdict::Safe
        }
    }
}

/// Partition a function order; safe-listed functions are dropped entirely.
pub fn classify_order(order: &[String], lists: &ClassificationConfig) -> Classification {
    let mut seen = HashSet::new();
    let mut out = Classification::default();
    for function in order {
        if lists.safe.contains(function) || !seen.insert(function.as_str()) {
            continue;
        }
        if lists.vulnerable.contains(function) {
            out.vulnerable.push(function.clone());
        } else {
            out.unknown.push(function.clone());
        }
    }
    out
}

/// One allocation the overflow may have corrupted.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    /// Position of the allocation in the parsed record list.
    pub index: usize,
    pub address: u64,
    pub size: u64,
    /// Bytes of the allocation reached by the overflow.
    pub overlap: AddressInterval,
    pub trace: RangeTrace,
    pub classification: Classification,
    pub verdict: Verdict,
}

/// Outcome of an overflow analysis.
#[derive(Debug, Clone, Serialize)]
pub struct OverflowReport {
    pub source_address: u64,
    pub offset: u64,
    pub length: u64,
    pub overflow: OverflowInterval,
    pub bug_site_function: String,
    pub bug_site: BugSite,
    /// Candidates in parse order.
    pub candidates: Vec<CandidateReport>,
}

impl OverflowReport {
    /// Candidates touched by at least one known-vulnerable function.
    pub fn vulnerable(&self) -> impl Iterator<Item = &CandidateReport> {
        self.candidates
            .iter()
            .filter(|c| c.verdict == Verdict::Vulnerable)
    }
}

/// Map an overflow onto the allocations it may reach and grade each one.
///
/// Operations are replayed from the first header of `bug_site_function`; if
/// that function never appears the replay starts at the top of the trace.
pub fn analyze_overflow(
    store: &TraceStore,
    source: &AllocationRecord,
    offset: u64,
    length: u64,
    records: &[AllocationRecord],
    bug_site_function: &str,
    lists: &ClassificationConfig,
) -> Result<OverflowReport> {
    let overflow = OverflowInterval::from_source(source, offset, length)?;
    let source_label = format!("{:#x}", source.address);
    let span = span_trace!("analyze_overflow", source = %source_label, %overflow);
    let _guard = span.enter();

    let bug_site = find_function_header(store, bug_site_function);

    let mut candidates = Vec::new();
    for (index, record) in records.iter().enumerate() {
        if !overflow.may_overlap(record) {
            continue;
        }
        let overlap = overflow.intersection(record);
        let trace = trace_range(store, bug_site.line, overlap)?;
        let classification = classify_order(&trace.function_order, lists);
        let verdict = classification.verdict();
        debug!(
            address = format_args!("{:#x}", record.address),
            %overlap,
            %verdict,
            functions = trace.function_order.len(),
            "Graded candidate"
        );
        candidates.push(CandidateReport {
            index,
            address: record.address,
            size: record.size,
            overlap,
            trace,
            classification,
            verdict,
        });
    }

    info!(
        candidates = candidates.len(),
        bug_site_line = bug_site.line,
        "Overflow analysis complete"
    );
    Ok(OverflowReport {
        source_address: source.address,
        offset,
        length,
        overflow,
        bug_site_function: bug_site_function.to_string(),
        bug_site,
        candidates,
    })
}
