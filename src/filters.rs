//! Call-stack classification filters for allocation records.
//!
//! Each predicate inspects one token per stack frame (function or module)
//! and tests it against a name set. Filters produce views over the parsed
//! records; they never copy or take ownership of them.

use crate::config::{FilterConfig, NameSet};
use crate::trace::AllocationRecord;
use tracing::debug;

/// `true` when no frame of the record calls an allow-listed function.
pub fn passes_allow(record: &AllocationRecord, allow: &NameSet) -> bool {
    !record.functions().any(|f| allow.contains(f))
}

/// `true` when at least one frame calls a targeted function.
pub fn passes_target(record: &AllocationRecord, target: &NameSet) -> bool {
    record.functions().any(|f| target.contains(f))
}

/// `true` when at least one frame comes from a listed module.
pub fn passes_module(record: &AllocationRecord, modules: &NameSet) -> bool {
    record.modules().any(|m| modules.contains(m))
}

/// Applies the allow → target → module stages configured in a [`FilterConfig`].
///
/// Stages whose list is `None` are skipped.
#[derive(Debug, Clone, Copy)]
pub struct FilterPipeline<'c> {
    config: &'c FilterConfig,
}

impl<'c> FilterPipeline<'c> {
    pub fn new(config: &'c FilterConfig) -> Self {
        Self { config }
    }

    /// `true` when `record` survives every enabled stage.
    pub fn accepts(&self, record: &AllocationRecord) -> bool {
        self.config
            .allow
            .as_ref()
            .map_or(true, |allow| passes_allow(record, allow))
            && self
                .config
                .target
                .as_ref()
                .map_or(true, |target| passes_target(record, target))
            && self
                .config
                .module
                .as_ref()
                .map_or(true, |modules| passes_module(record, modules))
    }

    /// Indices into `records` of the allocations that pass, in input order.
    pub fn select(&self, records: &[AllocationRecord]) -> Vec<usize> {
        let selected: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.accepts(record))
            .map(|(idx, _)| idx)
            .collect();
        debug!(
            input = records.len(),
            kept = selected.len(),
            "Filtered allocations"
        );
        selected
    }

    /// The allocations that pass, in input order.
    pub fn apply<'r>(&self, records: &'r [AllocationRecord]) -> Vec<&'r AllocationRecord> {
        records.iter().filter(|r| self.accepts(r)).collect()
    }
}
