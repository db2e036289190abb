//! Allocation records and the allocation pass over a trace.

use super::{classify_line, TraceLine};
use crate::error::{parse_decimal, parse_hex, Result};
use crate::io::TraceStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One call-stack entry of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function name (third token of the frame text).
    pub function_name: String,
    /// Source file or binary the frame belongs to.
    pub module: String,
    /// Frame text as emitted by the tracer, starting at `at`/`by`.
    pub raw: String,
}

impl StackFrame {
    /// Parse `<at|by> <address> <function> (<module>:<line>)`.
    ///
    /// Frames missing a function token keep an empty name so they never
    /// match any list.
    pub fn parse(text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let function_name = tokens.get(2).copied().unwrap_or_default().to_string();
        let module = if tokens.len() > 3 {
            tokens
                .last()
                .map(|t| {
                    let t = t.trim_start_matches('(').trim_end_matches(')');
                    t.split(':').next().unwrap_or_default().to_string()
                })
                .unwrap_or_default()
        } else {
            String::new()
        };
        Self {
            function_name,
            module,
            raw: tokens.join(" "),
        }
    }

    /// Trailing `(<module>:<line>)` location, if present.
    pub fn location(&self) -> &str {
        if self.raw.ends_with(')') {
            self.raw.rsplit(' ').next().unwrap_or_default()
        } else {
            ""
        }
    }
}

/// An allocation discovered in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Start of the allocated region.
    pub address: u64,
    /// Size in bytes.
    pub size: u64,
    /// Frames in the order the trace lists them; the first one is innermost.
    pub call_stack: Vec<StackFrame>,
    /// 1-based line of the summary line; range scans may start here.
    pub origin_line: usize,
    /// Last function execution order computed for this record.
    pub function_order: Vec<String>,
}

impl AllocationRecord {
    /// One past the last byte of the allocation.
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    /// Functions of every frame, in stack order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.call_stack.iter().map(|f| f.function_name.as_str())
    }

    /// Modules of every frame, in stack order.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.call_stack.iter().map(|f| f.module.as_str())
    }

    /// Function of the innermost frame, where the allocation was requested.
    pub fn allocation_site(&self) -> Option<&str> {
        self.call_stack.first().map(|f| f.function_name.as_str())
    }

    /// Location of the outermost listed frame, used as a short label.
    pub fn site(&self) -> &str {
        self.call_stack
            .last()
            .map(StackFrame::location)
            .unwrap_or_default()
    }

    /// The call stack as newline-terminated frame lines.
    pub fn stack_text(&self) -> String {
        self.call_stack
            .iter()
            .map(|f| format!("{}\n", f.raw))
            .collect()
    }
}

/// Outcome of the allocation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseReport {
    pub records: Vec<AllocationRecord>,
    /// Allocations dropped because no well-formed summary line followed them.
    pub malformed: usize,
    /// The trace ended inside an allocation record.
    pub truncated: bool,
}

/// Collect every allocation in the trace, in order of appearance.
pub fn parse_allocations(store: &TraceStore) -> Result<Vec<AllocationRecord>> {
    parse_allocations_detailed(store).map(|report| report.records)
}

/// Like [`parse_allocations`], also reporting dropped and truncated records.
///
/// Malformed summaries are skipped and a trace ending mid-record stops the
/// pass; only unparsable numbers in a summary line are errors.
pub fn parse_allocations_detailed(store: &TraceStore) -> Result<ParseReport> {
    let mut report = ParseReport::default();
    let mut lines = store.lines().peekable();

    while let Some((marker_line, text)) = lines.next() {
        if classify_line(&text) != TraceLine::AllocationMarker {
            continue;
        }

        let mut call_stack = Vec::new();
        while let Some((_, frame)) = lines.next_if(|(_, t)| is_stack_frame(t)) {
            if let TraceLine::StackFrame(body) = classify_line(&frame) {
                call_stack.push(StackFrame::parse(body));
            }
        }

        let Some((term_line, term)) = lines.next() else {
            report.truncated = true;
            break;
        };

        // The summary either ends the stack block or follows one separator line.
        let summary = if is_summary(&term) {
            Some((term_line, term))
        } else if lines.peek().is_none() {
            report.truncated = true;
            break;
        } else {
            lines.next_if(|(_, t)| is_summary(t))
        };

        match summary {
            Some((line_no, text)) => match parse_summary(&text, line_no)? {
                Some((address, size)) => {
                    debug!(
                        address = format_args!("{address:#x}"),
                        size,
                        frames = call_stack.len(),
                        line = line_no,
                        "Parsed allocation"
                    );
                    report.records.push(AllocationRecord {
                        address,
                        size,
                        call_stack,
                        origin_line: line_no,
                        function_order: Vec::new(),
                    });
                }
                None => {
                    debug!(line = line_no, "Dropping allocation with short summary line");
                    report.malformed += 1;
                }
            },
            None => {
                debug!(line = marker_line, "Dropping allocation without summary line");
                report.malformed += 1;
            }
        }
    }

    if report.truncated {
        debug!("Trace ended inside an allocation record");
    }
    info!(
        allocations = report.records.len(),
        malformed = report.malformed,
        truncated = report.truncated,
        "Parsed allocations"
    );
    Ok(report)
}

fn is_stack_frame(line: &str) -> bool {
    matches!(classify_line(line), TraceLine::StackFrame(_))
}

fn is_summary(line: &str) -> bool {
    classify_line(line) == TraceLine::AllocationSummary
}

/// Extract `(address, size)` from `Address <hex>, size: <dec>`.
///
/// `Ok(None)` when the line is too short; `Err` when a number is corrupt.
fn parse_summary(line: &str, line_no: usize) -> Result<Option<(u64, u64)>> {
    let cleaned = line.replace([',', ':'], "");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() <= 4 || tokens[1] != "Address" {
        return Ok(None);
    }
    let address = parse_hex(tokens[2], line_no)?;
    let size = parse_decimal(tokens[4], line_no)?;
    Ok(Some((address, size)))
}
