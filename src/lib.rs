//! Offline memory-trace forensics.
//!
//! `memtrace` reads the text trace produced by an instrumented run
//! (allocation records with call stacks, plus every load and store grouped
//! under the function performing it) and answers two questions: which
//! functions touched a given byte range and in what order, and which other
//! allocations an out-of-bounds write of known offset and length may have
//! corrupted.
//!
//! ```no_run
//! use memtrace::config::AnalysisConfig;
//! use memtrace::session::Session;
//!
//! # fn main() -> memtrace::error::Result<()> {
//! let mut session = Session::open("trace.log", AnalysisConfig::default())?;
//! let outcome = session.analyze_overflow(0, 0x50, 0x20, "copy_in")?;
//! for candidate in &outcome.report.candidates {
//!     println!("{:#x}: {}", candidate.address, candidate.verdict);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod filters;
pub mod io;
pub mod logging;
pub mod session;
pub mod trace;
pub mod tracer;

pub use error::{MemtraceError, Result};
