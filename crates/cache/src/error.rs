//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking. Worker-side
//! failures travel back to the foreground as a reason string inside the
//! response, so the kinds here are what the foreground can act on.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The durable cache store failed.
    #[display("cache storage error")]
    Storage,
    /// The network could not be reached.
    #[display("network unreachable")]
    Network,
    /// The network answered, but not with a success status.
    #[display("HTTP {status} fetching {path}")]
    Fetch { path: String, status: u16 },
    #[display("invalid manual id: {_0:?}")]
    InvalidManualId(#[error(not(source))] String),
    /// Stored or fetched data could not be decoded.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The worker did not answer in time. The operation may still complete.
    #[display("worker response timed out")]
    Timeout,
    /// No worker became active in time.
    #[display("worker not ready")]
    NotReady,
    /// The worker task is gone.
    #[display("worker stopped")]
    WorkerStopped,
    /// The worker answered with a failure.
    #[display("worker reported failure: {_0}")]
    Rejected(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::Timeout | Self::NotReady | Self::Rejected(_) => true,
            Self::Fetch { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
