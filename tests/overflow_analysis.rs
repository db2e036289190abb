//! End-to-end tests: range tracing and overflow impact analysis.

mod common;

use common::*;
use memtrace::analysis::overflow::Verdict;
use memtrace::config::{AnalysisConfig, NameSet};
use memtrace::session::Session;
use memtrace::tracer::{trace_range, AddressInterval};
use memtrace::io::TraceStore;
use memtrace::MemtraceError;
use std::collections::BTreeSet;
use std::fs;

fn session_with(trace: &str, config: AnalysisConfig) -> (tempfile::NamedTempFile, Session) {
    let file = trace_file(trace);
    let session = Session::open(file.path(), config).unwrap();
    (file, session)
}

#[test]
fn test_single_store_scenario() {
    let store = TraceStore::from_text(SINGLE_STORE);
    let result = trace_range(&store, 0, AddressInterval::new(0x2000, 0x2010).unwrap()).unwrap();
    assert_eq!(result.function_order, vec!["write_buf"]);
    assert_eq!(result.matched_ops, 1);
    assert_eq!(
        result.lines,
        vec!["write_buf:", "\tStore 4 0x2004 into buf offset 0x4"]
    );
}

#[test]
fn test_allocation_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_file, mut session) = session_with(HEAP_OVERFLOW, AnalysisConfig::default());
    let output = dir.path().join("session.trace");

    let trace = session.write_allocation_trace(1, &output).unwrap();
    assert_eq!(
        trace.function_order,
        vec!["new_session", "copy_payload", "memset", "session_touch"]
    );
    let written = fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("new_session:\n\tStore 8 0x1060"));
    assert_eq!(written.lines().count(), trace.lines.len());

    // A second run replaces the stored order rather than extending it.
    session.trace_allocation(1).unwrap();
    assert_eq!(session.function_order(1).unwrap().len(), 4);
}

#[test]
fn test_overflow_into_neighbour() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalysisConfig::default();
    config.output.artifact_root = dir.path().to_path_buf();
    config.classification.vulnerable = NameSet::from_text("copy_payload");
    config.classification.safe = NameSet::from_text("session_touch");
    let (_file, mut session) = session_with(HEAP_OVERFLOW, config);

    let outcome = session
        .analyze_overflow(0, 0x50, 0x20, "copy_payload")
        .unwrap();
    let report = &outcome.report;
    assert_eq!(report.overflow.start, 0x1050);
    assert_eq!(report.overflow.end, 0x1070);
    assert_eq!(report.bug_site.line, 29);
    assert!(report.bug_site.found);

    let addresses: Vec<u64> = report.candidates.iter().map(|c| c.address).collect();
    assert_eq!(addresses, vec![0x1000, 0x1060]);

    let victim = &report.candidates[1];
    assert_eq!(victim.overlap, AddressInterval::new(0x1060, 0x1070).unwrap());
    assert_eq!(victim.trace.function_order, vec!["copy_payload", "session_touch"]);
    assert_eq!(victim.classification.vulnerable, vec!["copy_payload"]);
    assert!(victim.classification.unknown.is_empty());
    assert_eq!(victim.verdict, Verdict::Vulnerable);
    assert_eq!(victim.trace.inferred_bases, BTreeSet::from([0x1000, 0x1060]));

    let source = &report.candidates[0];
    assert_eq!(source.verdict, Verdict::Safe);

    let artifact_dir = dir.path().join("29");
    assert_eq!(
        outcome.artifacts,
        vec![artifact_dir.join("0x1000.trace"), artifact_dir.join("0x1060.trace")]
    );
    let victim_trace = fs::read_to_string(&outcome.artifacts[1]).unwrap();
    assert_eq!(
        victim_trace,
        "copy_payload:\n\
         \tStore 8 0x1060 into packet offset 0x60\n\
         \tStore 8 0x1068 into packet offset 0x68\n\
         session_touch:\n\
         \tLoad 8 0x1068 from session offset 0x8\n"
    );
    assert!(fs::read_to_string(&outcome.artifacts[0]).unwrap().is_empty());
}

#[test]
fn test_boundary_adjacent_allocation_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalysisConfig::default();
    config.output.artifact_root = dir.path().to_path_buf();
    let (_file, mut session) = session_with(HEAP_OVERFLOW, config);

    let outcome = session
        .analyze_overflow(0, 0x50, 0x30, "copy_payload")
        .unwrap();
    let addresses: Vec<u64> = outcome.report.candidates.iter().map(|c| c.address).collect();
    // The timer at 0x1080 starts exactly at the overflow end.
    assert_eq!(addresses, vec![0x1000, 0x1060, 0x1080]);

    let session_obj = &outcome.report.candidates[1];
    assert_eq!(
        session_obj.trace.function_order,
        vec!["copy_payload", "memset", "session_touch"]
    );
    assert_eq!(session_obj.verdict, Verdict::Unknown);
    assert_eq!(outcome.report.candidates[2].verdict, Verdict::Safe);
}

#[test]
fn test_unknown_bug_site_scans_whole_trace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalysisConfig::default();
    config.output.artifact_root = dir.path().to_path_buf();
    let (_file, mut session) = session_with(HEAP_OVERFLOW, config);

    let outcome = session.analyze_overflow(0, 0x50, 0x20, "not_there").unwrap();
    assert!(!outcome.report.bug_site.found);
    assert_eq!(
        outcome.report.candidates[1].trace.function_order,
        vec!["new_session", "copy_payload", "session_touch"]
    );
    assert!(dir.path().join("0").join("0x1060.trace").exists());
}

#[test]
fn test_invalid_source_index() {
    let (_file, mut session) = session_with(HEAP_OVERFLOW, AnalysisConfig::default());
    assert!(session.analyze_overflow(42, 0, 8, "copy_payload").is_err());
}

#[test]
fn test_corrupt_operation_reaches_caller() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalysisConfig::default();
    config.output.artifact_root = dir.path().to_path_buf();
    let trace = format!("{SINGLE_STORE}==100== Store 4 0xZZ\n");
    let (_file, mut session) = session_with(&trace, config);

    let err = session.analyze_overflow(0, 0x8, 0x10, "write_buf").unwrap_err();
    assert!(matches!(err, MemtraceError::UnparsableNumeric { line: 12, .. }));
    assert!(matches!(
        session.trace_allocation(0),
        Err(MemtraceError::UnparsableNumeric { line: 12, .. })
    ));
    assert!(!dir.path().join("10").exists());
}
