//! Range tracing: which functions touched a byte range, and in what order.
//!
//! A range trace replays the trace's loads and stores, keeps the ones whose
//! address falls in a half-open interval, and records the enclosing function
//! of each contiguous run of matching operations. The result is returned as
//! a fresh [`RangeTrace`]; attaching it to an allocation is up to the caller.

use crate::error::{MemtraceError, Result};
use crate::io::TraceStore;
use crate::trace::{AllocationRecord, ScanEvent, TraceScanner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use tracing::{debug, trace};

/// Half-open byte interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressInterval {
    pub start: u64,
    pub end: u64,
}

impl AddressInterval {
    /// Create `[start, end)`; `end` must not precede `start`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(MemtraceError::InvalidInput(format!(
                "interval end {end:#x} precedes start {start:#x}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The bytes occupied by an allocation.
    pub fn of_allocation(record: &AllocationRecord) -> Self {
        Self {
            start: record.address,
            end: record.end(),
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for AddressInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

/// Result of one range trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeTrace {
    pub interval: AddressInterval,
    /// Function of each contiguous run of matching operations, in first-touch order.
    pub function_order: Vec<String>,
    /// Emitted lines: a `name:` header per run followed by tab-indented operations.
    pub lines: Vec<String>,
    /// Number of operations that fell inside the interval.
    pub matched_ops: usize,
    /// Distinct object starts inferred from the matched operations' base offsets.
    pub inferred_bases: BTreeSet<u64>,
}

impl RangeTrace {
    /// Write the emitted lines, one per line.
    pub fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for line in &self.lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }
}

/// Replay memory operations from `from_line` and keep those inside `interval`.
///
/// The function header in effect at `from_line` is inherited, so starting at
/// an allocation's origin line attributes operations exactly as a scan from
/// the top would. Operations with no enclosing function are skipped.
pub fn trace_range(
    store: &TraceStore,
    from_line: usize,
    interval: AddressInterval,
) -> Result<RangeTrace> {
    let mut result = RangeTrace {
        interval,
        function_order: Vec::new(),
        lines: Vec::new(),
        matched_ops: 0,
        inferred_bases: BTreeSet::new(),
    };
    // Set when the current header has been emitted for this run.
    let mut header_emitted = false;

    for event in TraceScanner::seeded(store, from_line) {
        match event? {
            ScanEvent::FunctionHeader { .. } => header_emitted = false,
            ScanEvent::Op(op) => {
                if !interval.contains(op.address) {
                    continue;
                }
                let Some(function) = op.function.as_deref() else {
                    continue;
                };
                trace!(line = op.line, function, address = op.address, "Matched operation");
                if !header_emitted {
                    result.lines.push(format!("{function}:"));
                    result.function_order.push(function.to_string());
                    header_emitted = true;
                }
                result.lines.push(format!("\t{}", op.body));
                result.matched_ops += 1;
                if let Some(base) = op.inferred_base() {
                    result.inferred_bases.insert(base);
                }
            }
        }
    }

    debug!(
        %interval,
        from_line,
        matched = result.matched_ops,
        functions = result.function_order.len(),
        "Range trace complete"
    );
    Ok(result)
}

/// Trace an allocation's own bytes, starting from where it was allocated.
pub fn trace_allocation(store: &TraceStore, record: &AllocationRecord) -> Result<RangeTrace> {
    trace_range(store, record.origin_line, AddressInterval::of_allocation(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::parse_allocations;

    const TRACE: &str = "\
==3== Detected allocation of 16 bytes
==3==    at 0x1: malloc (m.c:1)
==3==
==3== Address 0x2000, size: 16
==3== fill:
==3== Store 4 0x2000 into buf offset 0x0
==3== Store 4 0x2004 into buf offset 0x4
==3== Load 4 0x9000
==3== Store 4 0x2008 into buf offset 0x8
==3== log:
==3== Load 4 0x9004
==3== check:
==3== Load 4 0x2010
==3== Load 4 0x200c
==3== fill:
==3== Store 4 0x2000
";

    #[test]
    fn interval_is_half_open() {
        let iv = AddressInterval::new(0x2000, 0x2010).unwrap();
        assert!(iv.contains(0x2000));
        assert!(iv.contains(0x200f));
        assert!(!iv.contains(0x2010));
        assert_eq!(iv.len(), 0x10);
        assert_eq!(iv.to_string(), "[0x2000, 0x2010)");
        assert!(AddressInterval::new(2, 1).is_err());
        assert!(AddressInterval::new(5, 5).unwrap().is_empty());
    }

    #[test]
    fn runs_are_recorded_in_first_touch_order() {
        let store = TraceStore::from_text(TRACE);
        let iv = AddressInterval::new(0x2000, 0x2010).unwrap();
        let result = trace_range(&store, 0, iv).unwrap();

        // `log` never touches the range; `fill` is revisited later.
        assert_eq!(result.function_order, vec!["fill", "check", "fill"]);
        assert_eq!(result.matched_ops, 5);
        assert_eq!(
            result.lines,
            vec![
                "fill:",
                "\tStore 4 0x2000 into buf offset 0x0",
                "\tStore 4 0x2004 into buf offset 0x4",
                "\tStore 4 0x2008 into buf offset 0x8",
                "check:",
                "\tLoad 4 0x200c",
                "fill:",
                "\tStore 4 0x2000",
            ]
        );
        assert_eq!(result.inferred_bases, BTreeSet::from([0x2000]));
    }

    #[test]
    fn out_of_range_ops_do_not_split_runs() {
        let store = TraceStore::from_text(
            "==1== f:\n==1== Load 4 0x10\n==1== Load 4 0x99\n==1== Load 4 0x14\n",
        );
        let result = trace_range(&store, 0, AddressInterval::new(0x10, 0x20).unwrap()).unwrap();
        assert_eq!(result.function_order, vec!["f"]);
        assert_eq!(result.matched_ops, 2);
    }

    #[test]
    fn operations_without_header_are_ignored() {
        let store = TraceStore::from_text("==1== Load 4 0x10\n==1== Store 4 0x11\n");
        let result = trace_range(&store, 0, AddressInterval::new(0, 0x100).unwrap()).unwrap();
        assert!(result.function_order.is_empty());
        assert!(result.lines.is_empty());
    }

    #[test]
    fn tracing_is_deterministic() {
        let store = TraceStore::from_text(TRACE);
        let iv = AddressInterval::new(0x2004, 0x2008).unwrap();
        let a = trace_range(&store, 0, iv).unwrap();
        let b = trace_range(&store, 0, iv).unwrap();
        assert_eq!(a, b);

        let mut first = Vec::new();
        let mut second = Vec::new();
        a.write_to(&mut first).unwrap();
        b.write_to(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            String::from_utf8(first).unwrap(),
            "fill:\n\tStore 4 0x2004 into buf offset 0x4\n"
        );
    }

    #[test]
    fn allocation_trace_starts_at_origin() {
        let store = TraceStore::from_text(TRACE);
        let records = parse_allocations(&store).unwrap();
        let result = trace_allocation(&store, &records[0]).unwrap();
        assert_eq!(result.interval, AddressInterval::new(0x2000, 0x2010).unwrap());
        assert_eq!(result.function_order, vec!["fill", "check", "fill"]);
    }

    #[test]
    fn corrupt_address_aborts_the_trace() {
        let store = TraceStore::from_text("==3== fill:\n==3== Store 4 0x2000\n==3== Store 4 0xZZ\n");
        let err = trace_range(&store, 0, AddressInterval::new(0x2000, 0x2010).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MemtraceError::UnparsableNumeric { line: 3, ref token, .. } if token == "0xZZ"
        ));
    }

    #[test]
    fn seeded_start_inherits_header() {
        let store = TraceStore::from_text(TRACE);
        // Line 7 is inside `fill`, after its header.
        let result = trace_range(&store, 7, AddressInterval::new(0x2000, 0x2010).unwrap()).unwrap();
        assert_eq!(result.function_order, vec!["fill", "check", "fill"]);
        assert_eq!(result.lines[1], "\tStore 4 0x2004 into buf offset 0x4");
    }
}
