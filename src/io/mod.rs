//! Line-addressable, read-only access to trace text.
//!
//! `TraceStore` memory-maps a trace file (or wraps text already in memory),
//! indexes its line starts once, and then hands out forward iterators that
//! can be restarted from any 1-based line number. Several analyses rescan the
//! same trace with different filters, so the index is built only once.

use crate::error::{MemtraceError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Defines the resource limits for loading a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLimits {
    /// The absolute maximum trace size that can be opened.
    pub max_trace_bytes: u64,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_trace_bytes: 4 * 1024 * 1024 * 1024, // 4GB
        }
    }
}

enum Backing {
    Mapped(Mmap),
    Owned(Bytes),
}

impl Backing {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => &map[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }
}

/// Append-only view over the raw trace text with a line index.
pub struct TraceStore {
    path: Option<PathBuf>,
    backing: Backing,
    // Byte offset of the first character of every line.
    line_starts: Vec<usize>,
}

impl TraceStore {
    /// Opens a trace file and memory-maps it.
    ///
    /// Fails with `TraceTooLarge` when the file exceeds `limits.max_trace_bytes`.
    pub fn open<P: AsRef<Path>>(path: P, limits: &TraceLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size,
            limit = limits.max_trace_bytes,
            "Opening trace"
        );

        if size > limits.max_trace_bytes {
            warn!(
                path = %path.display(),
                size,
                limit = limits.max_trace_bytes,
                "Trace is too large"
            );
            return Err(MemtraceError::TraceTooLarge {
                limit: limits.max_trace_bytes,
                found: size,
            });
        }

        // memmap cannot map empty files.
        let backing = if size == 0 {
            Backing::Owned(Bytes::new())
        } else {
            // Safety: read-only map of a regular file; the trace is not modified while analysed.
            Backing::Mapped(unsafe { Mmap::map(&file)? })
        };

        Ok(Self::with_backing(Some(path.to_path_buf()), backing))
    }

    /// Wraps trace text that is already in memory.
    pub fn from_text(text: impl Into<String>) -> Self {
        let bytes = Bytes::from(text.into().into_bytes());
        Self::with_backing(None, Backing::Owned(bytes))
    }

    fn with_backing(path: Option<PathBuf>, backing: Backing) -> Self {
        let data = backing.as_bytes();
        let mut line_starts = Vec::new();
        if !data.is_empty() {
            line_starts.push(0);
            line_starts.extend(
                memchr::memchr_iter(b'\n', data)
                    .map(|nl| nl + 1)
                    .filter(|&start| start < data.len()),
            );
        }
        debug!(lines = line_starts.len(), bytes = data.len(), "Indexed trace");
        Self {
            path,
            backing,
            line_starts,
        }
    }

    /// Path the trace was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total size of the trace text in bytes.
    pub fn len_bytes(&self) -> usize {
        self.backing.as_bytes().len()
    }

    /// Number of lines in the trace.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns line `line_no` (1-based) without its line terminator.
    pub fn line(&self, line_no: usize) -> Option<Cow<'_, str>> {
        if line_no == 0 || line_no > self.line_starts.len() {
            return None;
        }
        let data = self.backing.as_bytes();
        let start = self.line_starts[line_no - 1];
        let end = self
            .line_starts
            .get(line_no)
            .copied()
            .unwrap_or(data.len());
        let mut raw = &data[start..end];
        while let [rest @ .., b'\n' | b'\r'] = raw {
            raw = rest;
        }
        Some(String::from_utf8_lossy(raw))
    }

    /// Forward iterator over `(line_no, text)` starting at `line_no`.
    ///
    /// `0` and `1` both start at the top of the trace.
    pub fn lines_from(&self, line_no: usize) -> Lines<'_> {
        Lines {
            store: self,
            next: line_no.max(1),
        }
    }

    /// Forward iterator over the whole trace.
    pub fn lines(&self) -> Lines<'_> {
        self.lines_from(1)
    }
}

impl std::fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceStore")
            .field("path", &self.path)
            .field("bytes", &self.len_bytes())
            .field("lines", &self.line_count())
            .finish()
    }
}

/// Restartable forward scan over a [`TraceStore`].
pub struct Lines<'a> {
    store: &'a TraceStore,
    next: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        let line_no = self.next;
        let text = self.store.line(line_no)?;
        self.next += 1;
        Some((line_no, text))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.store.line_count() + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
