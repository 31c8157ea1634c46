//! Search Error Types
//!
//! Only loading static artifacts can fail. Querying, context extraction and
//! highlighting degrade to empty or sentinel output instead of erroring.

use derive_more::{Display, Error};

/// A search error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The search index artifact could not be decoded.
    #[display("invalid search index")]
    InvalidIndex,
    /// The table of contents artifact could not be decoded.
    #[display("invalid table of contents")]
    InvalidToc,
    /// A line of a delimited table of contents is malformed.
    #[display("malformed table of contents entry on line {line}: {value}")]
    MalformedTocLine {
        /// One-based line number.
        line: usize,
        /// The offending line.
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Artifacts are static: they either decode or they don't.
        false
    }
}
