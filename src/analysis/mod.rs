//! Corruption analysis on top of range tracing.
//!
//! `overflow` maps an out-of-bounds write onto the allocations it may reach
//! and grades the functions that touched each overlap; `artifacts` persists
//! the per-allocation and per-candidate trace subsets.

pub mod artifacts;
pub mod overflow;

pub use overflow::{
    analyze_overflow, classify_order, CandidateReport, Classification, OverflowInterval,
    OverflowReport, Verdict,
};
