//! Memory operations and the lazy forward scan that produces them.

use super::{classify_line, TraceLine};
use crate::error::{parse_hex, Result};
use crate::io::{Lines, TraceStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Kind of memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryOpKind {
    Load,
    Store,
}

/// A single load or store, attributed to the function header above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryOp {
    /// 1-based trace line of the operation.
    pub line: usize,
    pub kind: MemoryOpKind,
    pub address: u64,
    /// Offset of the access inside its base object, when the tracer recorded one.
    pub base_offset: Option<u64>,
    /// `None` when no function header has been seen yet.
    pub function: Option<String>,
    /// Operation text without the tool prefix.
    pub body: String,
}

impl MemoryOp {
    /// Start address of the object this access went through (`address - offset`).
    pub fn inferred_base(&self) -> Option<u64> {
        self.base_offset
            .and_then(|offset| self.address.checked_sub(offset))
    }
}

/// Event produced by [`TraceScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A function header; subsequent operations belong to `name`.
    FunctionHeader { line: usize, name: String },
    /// A load or store.
    Op(MemoryOp),
}

/// Forward-only scan over function headers and memory operations.
///
/// All other lines (allocation records, banners, blanks) are skipped. A
/// scan ends at end of trace; restart it by constructing a new scanner.
pub struct TraceScanner<'a> {
    lines: Lines<'a>,
    current: Option<String>,
}

impl<'a> TraceScanner<'a> {
    /// Scan from `from_line` (1-based, `0` = top) with no enclosing function.
    pub fn new(store: &'a TraceStore, from_line: usize) -> Self {
        Self {
            lines: store.lines_from(from_line),
            current: None,
        }
    }

    /// Scan from `from_line`, attributing the first operations to the nearest
    /// function header above the start line.
    pub fn seeded(store: &'a TraceStore, from_line: usize) -> Self {
        Self {
            lines: store.lines_from(from_line),
            current: function_before(store, from_line),
        }
    }
}

impl<'a> Iterator for TraceScanner<'a> {
    type Item = Result<ScanEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for (line_no, text) in self.lines.by_ref() {
            match classify_line(&text) {
                TraceLine::FunctionHeader(name) => {
                    self.current = Some(name.to_string());
                    return Some(Ok(ScanEvent::FunctionHeader {
                        line: line_no,
                        name: name.to_string(),
                    }));
                }
                TraceLine::MemoryOp {
                    kind,
                    address,
                    base_offset,
                    body,
                } => {
                    let address = match parse_hex(address, line_no) {
                        Ok(address) => address,
                        Err(e) => return Some(Err(e)),
                    };
                    // The offset is an optional annotation; unreadable values are ignored.
                    let base_offset = base_offset.and_then(|t| parse_hex(t, line_no).ok());
                    return Some(Ok(ScanEvent::Op(MemoryOp {
                        line: line_no,
                        kind,
                        address,
                        base_offset,
                        function: self.current.clone(),
                        body: body.to_string(),
                    })));
                }
                _ => continue,
            }
        }
        None
    }
}

/// Lazily yield every memory operation from `from_line` on.
pub fn scan_memory_ops(
    store: &TraceStore,
    from_line: usize,
) -> impl Iterator<Item = Result<MemoryOp>> + '_ {
    TraceScanner::new(store, from_line).filter_map(|event| match event {
        Ok(ScanEvent::Op(op)) => Some(Ok(op)),
        Ok(ScanEvent::FunctionHeader { .. }) => None,
        Err(e) => Some(Err(e)),
    })
}

/// Where an overflow analysis starts scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugSite {
    /// 1-based line of the bug-site function header, `0` when not found.
    pub line: usize,
    pub found: bool,
}

/// Locate the first header line for `function`.
///
/// A missing function degrades to line `0` (scan from the top).
pub fn find_function_header(store: &TraceStore, function: &str) -> BugSite {
    let hit = store.lines().find_map(|(line_no, text)| match classify_line(&text) {
        TraceLine::FunctionHeader(name) if name == function => Some(line_no),
        _ => None,
    });
    match hit {
        Some(line) => {
            debug!(function, line, "Located bug-site function");
            BugSite { line, found: true }
        }
        None => {
            warn!(function, "Bug-site function not found, scanning from the top");
            BugSite {
                line: 0,
                found: false,
            }
        }
    }
}

/// Nearest function header strictly above `line_no`.
fn function_before(store: &TraceStore, line_no: usize) -> Option<String> {
    let upper = line_no.min(store.line_count() + 1);
    (1..upper).rev().find_map(|n| {
        let text = store.line(n)?;
        match classify_line(&text) {
            TraceLine::FunctionHeader(name) => Some(name.to_string()),
            _ => None,
        }
    })
}
