//! Error types for the memtrace analysis engine.
//!
//! Only failures the caller has to act on are modelled here. Recoverable
//! trace anomalies (a malformed allocation summary, a trace that ends in the
//! middle of a stack block, a bug-site function that never appears) are
//! handled where they occur and reported through counters and logs instead.

use thiserror::Error;

/// Main error type for memtrace operations.
#[derive(Debug, Error)]
pub enum MemtraceError {
    /// A token that must be a number could not be converted
    #[error("Unparsable {radix} value {token:?} at trace line {line}")]
    UnparsableNumeric {
        line: usize,
        token: String,
        radix: Radix,
    },

    /// Trace file exceeds the configured size limit
    #[error("Trace of {found} bytes exceeds the maximum allowed size of {limit} bytes")]
    TraceTooLarge { limit: u64, found: u64 },

    /// Invalid input from the analyst (index, interval, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be decoded
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Numeric base expected for a trace token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Hex,
    Decimal,
}

impl std::fmt::Display for Radix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Radix::Hex => write!(f, "hexadecimal"),
            Radix::Decimal => write!(f, "decimal"),
        }
    }
}

/// Result type alias for memtrace operations
pub type Result<T> = std::result::Result<T, MemtraceError>;

/// Parse a hexadecimal token, with or without a `0x` prefix.
///
/// Trailing `:` and `,` left over from the trace formatting are ignored.
pub fn parse_hex(token: &str, line: usize) -> Result<u64> {
    let cleaned = token.trim_end_matches([':', ',']);
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);
    u64::from_str_radix(digits, 16).map_err(|_| MemtraceError::UnparsableNumeric {
        line,
        token: token.to_string(),
        radix: Radix::Hex,
    })
}

/// Parse a decimal token.
pub fn parse_decimal(token: &str, line: usize) -> Result<u64> {
    token
        .trim_end_matches([':', ','])
        .parse::<u64>()
        .map_err(|_| MemtraceError::UnparsableNumeric {
            line,
            token: token.to_string(),
            radix: Radix::Decimal,
        })
}
