//! Trace text model.
//!
//! Every scanner in the crate shares the same line classifier: a trace line
//! is split on whitespace and recognised by the token at fixed positions.
//! Token 0 is the tool prefix (`==pid==`) and is never interpreted.
//!
//! | Line kind            | Shape                                              |
//! |----------------------|----------------------------------------------------|
//! | allocation marker    | `tok[1] == "Detected" && tok[2] == "allocation"`   |
//! | stack frame          | `tok[1] in {at, by}`, then `<addr> <fn> (<mod>:<line>)` |
//! | allocation summary   | `tok[1] == "Address"`, `tok[2]` hex, `tok[4]` size |
//! | memory operation     | `tok[1] in {Load, Store}`, `tok[3]` hex address    |
//! | function header      | exactly two tokens, `tok[1]` is the function name  |

pub mod alloc;
pub mod ops;

pub use self::alloc::{
    parse_allocations, parse_allocations_detailed, AllocationRecord, ParseReport, StackFrame,
};
pub use self::ops::{
    find_function_header, scan_memory_ops, BugSite, MemoryOp, MemoryOpKind, ScanEvent,
    TraceScanner,
};

/// Classification of a single trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine<'l> {
    /// Empty line or a line carrying only the tool prefix.
    Blank,
    /// Start of an allocation record.
    AllocationMarker,
    /// One call-stack entry; holds the text from the `at`/`by` keyword on.
    StackFrame(&'l str),
    /// `Address <hex>, size: <dec>` line closing an allocation record.
    AllocationSummary,
    /// A load or store.
    MemoryOp {
        kind: MemoryOpKind,
        address: &'l str,
        base_offset: Option<&'l str>,
        /// Text after the tool prefix, used when emitting the operation.
        body: &'l str,
    },
    /// A new enclosing function for the operations that follow.
    FunctionHeader(&'l str),
    /// Anything else (tool banners, summaries, ...).
    Other,
}

/// Classify `line` according to the shared trace grammar.
pub fn classify_line(line: &str) -> TraceLine<'_> {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .map(|t| t.trim_end_matches(':'))
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() <= 1 {
        return TraceLine::Blank;
    }

    match tokens[1] {
        "Detected" if tokens.get(2) == Some(&"allocation") => TraceLine::AllocationMarker,
        "at" | "by" => TraceLine::StackFrame(after_first_token(line)),
        "Address" | "Address," => TraceLine::AllocationSummary,
        "Load" | "Store" if tokens.len() >= 4 => TraceLine::MemoryOp {
            kind: if tokens[1] == "Load" {
                MemoryOpKind::Load
            } else {
                MemoryOpKind::Store
            },
            address: tokens[3],
            base_offset: tokens.get(7).copied(),
            body: after_first_token(line),
        },
        name if tokens.len() == 2 => TraceLine::FunctionHeader(name),
        _ => TraceLine::Other,
    }
}

/// Returns `line` with its leading whitespace and first token removed.
pub(crate) fn after_first_token(line: &str) -> &str {
    let trimmed = line.trim();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => trimmed[idx..].trim_start(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_allocation_lines() {
        assert_eq!(
            classify_line("==42== Detected allocation of 16 bytes"),
            TraceLine::AllocationMarker
        );
        assert_eq!(
            classify_line("==42==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)"),
            TraceLine::StackFrame("at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)")
        );
        assert_eq!(
            classify_line("==42== Address 0x2000, size: 16"),
            TraceLine::AllocationSummary
        );
    }

    #[test]
    fn classifies_operations_and_headers() {
        match classify_line("==42== Store 4 0x2004 from block offset 0x4") {
            TraceLine::MemoryOp {
                kind,
                address,
                base_offset,
                body,
            } => {
                assert_eq!(kind, MemoryOpKind::Store);
                assert_eq!(address, "0x2004");
                assert_eq!(base_offset, Some("0x4"));
                assert_eq!(body, "Store 4 0x2004 from block offset 0x4");
            }
            other => panic!("unexpected classification: {other:?}"),
        }

        assert_eq!(
            classify_line("==42== write_buf:"),
            TraceLine::FunctionHeader("write_buf")
        );
        // A detached colon does not count as a token.
        assert_eq!(
            classify_line("==42== write_buf :"),
            TraceLine::FunctionHeader("write_buf")
        );
    }

    #[test]
    fn short_and_unknown_lines() {
        assert_eq!(classify_line(""), TraceLine::Blank);
        assert_eq!(classify_line("==42=="), TraceLine::Blank);
        assert_eq!(classify_line("==42== Load 4"), TraceLine::Other);
        assert_eq!(
            classify_line("==42== Memcheck, a memory error detector"),
            TraceLine::Other
        );
    }

    #[test]
    fn strips_only_the_first_token() {
        assert_eq!(after_first_token("  ==1==   Load 8 0x10"), "Load 8 0x10");
        assert_eq!(after_first_token("single"), "");
    }
}
