//! Analysis session: one parsed trace plus the analyst's configuration.
//!
//! The session owns the trace and the allocation records for their whole
//! lifetime. Filters hand out index views into the records; range traces and
//! overflow analyses store their function order back on the records they
//! targeted, replacing whatever a previous run left there.

use crate::analysis::artifacts::{write_candidate_artifacts, write_range_trace};
use crate::analysis::overflow::{analyze_overflow, OverflowReport};
use crate::config::AnalysisConfig;
use crate::error::{MemtraceError, Result};
use crate::filters::FilterPipeline;
use crate::io::TraceStore;
use crate::trace::{parse_allocations_detailed, AllocationRecord};
use crate::tracer::{trace_allocation, RangeTrace};
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of [`Session::analyze_overflow`].
#[derive(Debug, Clone)]
pub struct OverflowOutcome {
    pub report: OverflowReport,
    /// Candidate artifacts, in candidate order.
    pub artifacts: Vec<PathBuf>,
}

/// A parsed trace and the state of the analyses run against it.
#[derive(Debug)]
pub struct Session {
    store: TraceStore,
    records: Vec<AllocationRecord>,
    malformed: usize,
    truncated: bool,
    config: AnalysisConfig,
}

impl Session {
    /// Open and parse a trace file.
    pub fn open<P: AsRef<Path>>(path: P, config: AnalysisConfig) -> Result<Self> {
        let store = TraceStore::open(path, &config.limits)?;
        Self::from_store(store, config)
    }

    /// Parse a trace already held in a [`TraceStore`].
    pub fn from_store(store: TraceStore, config: AnalysisConfig) -> Result<Self> {
        let report = parse_allocations_detailed(&store)?;
        info!(
            allocations = report.records.len(),
            lines = store.line_count(),
            "Session ready"
        );
        Ok(Self {
            store,
            records: report.records,
            malformed: report.malformed,
            truncated: report.truncated,
            config,
        })
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Mutable access for replacing name lists between analyses.
    pub fn config_mut(&mut self) -> &mut AnalysisConfig {
        &mut self.config
    }

    /// Every allocation in parse order.
    pub fn allocations(&self) -> &[AllocationRecord] {
        &self.records
    }

    /// Allocations dropped for a malformed summary line.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Whether the trace ended inside an allocation record.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Indices of the allocations passing the configured filters.
    pub fn filtered(&self) -> Vec<usize> {
        FilterPipeline::new(&self.config.filters).select(&self.records)
    }

    /// The allocations passing the configured filters, in parse order.
    pub fn filtered_records(&self) -> Vec<&AllocationRecord> {
        FilterPipeline::new(&self.config.filters).apply(&self.records)
    }

    pub fn allocation(&self, index: usize) -> Result<&AllocationRecord> {
        self.records.get(index).ok_or_else(|| out_of_range(index, self.records.len()))
    }

    /// Function order left by the last trace of allocation `index`.
    pub fn function_order(&self, index: usize) -> Result<&[String]> {
        self.allocation(index).map(|r| r.function_order.as_slice())
    }

    /// Trace the bytes of allocation `index` and remember its function order.
    pub fn trace_allocation(&mut self, index: usize) -> Result<RangeTrace> {
        let trace = trace_allocation(&self.store, self.allocation(index)?)?;
        self.records[index].function_order = trace.function_order.clone();
        Ok(trace)
    }

    /// Like [`Session::trace_allocation`], also writing the trace to `output`.
    pub fn write_allocation_trace(&mut self, index: usize, output: &Path) -> Result<RangeTrace> {
        let trace = self.trace_allocation(index)?;
        write_range_trace(output, &trace)?;
        Ok(trace)
    }

    /// Run an overflow analysis from allocation `source` and write the
    /// candidate artifacts under the configured artifact root.
    pub fn analyze_overflow(
        &mut self,
        source: usize,
        offset: u64,
        length: u64,
        bug_site_function: &str,
    ) -> Result<OverflowOutcome> {
        let report = analyze_overflow(
            &self.store,
            self.allocation(source)?,
            offset,
            length,
            &self.records,
            bug_site_function,
            &self.config.classification,
        )?;
        for candidate in &report.candidates {
            self.records[candidate.index].function_order = candidate.trace.function_order.clone();
        }
        let artifacts = write_candidate_artifacts(&self.config.output.artifact_root, &report)?;
        Ok(OverflowOutcome { report, artifacts })
    }
}

fn out_of_range(index: usize, len: usize) -> MemtraceError {
    MemtraceError::InvalidInput(format!(
        "allocation index {index} out of range ({len} allocations)"
    ))
}
