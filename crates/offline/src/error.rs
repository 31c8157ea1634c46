//! Offline Error Types
//!
//! Every coordinator operation returns one of these to its caller, which is
//! expected to turn it into a user-facing notification. Timeouts are kept
//! apart from worker failures so callers can give different guidance.

use derive_more::{Display, Error};
use exn::ResultExt;
use folio_cache::error::{ErrorKind as CacheErrorKind, Result as CacheResult};

/// An offline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for offline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No worker is available this session; offline features are disabled.
    #[display("offline support is unavailable")]
    Unavailable,
    /// A download of this manual is already running.
    #[display("download already in progress: {_0}")]
    DownloadPending(#[error(not(source))] String),
    /// The worker did not answer in time; it may still finish in the background.
    #[display("worker response timed out")]
    Timeout,
    /// The worker reported a failure.
    #[display("worker failed: {_0}")]
    Worker(#[error(not(source))] String),
    /// The local mirror could not be read or written.
    #[display("local mirror error")]
    Mirror,
    /// A manual artifact could not be fetched or decoded.
    #[display("manual artifact unavailable: {_0}")]
    Catalog(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Worker(_) | Self::Catalog(_))
    }
}

/// Translate a worker-side result into the coordinator's vocabulary.
pub(crate) fn from_worker<T>(result: CacheResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let kind = match &*e {
                CacheErrorKind::Timeout => ErrorKind::Timeout,
                CacheErrorKind::WorkerStopped | CacheErrorKind::NotReady => ErrorKind::Unavailable,
                CacheErrorKind::Rejected(reason) => ErrorKind::Worker(reason.clone()),
                other => ErrorKind::Worker(other.to_string()),
            };
            Err(e).or_raise(|| kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CacheErrorKind::Timeout, ErrorKind::Timeout)]
    #[case(CacheErrorKind::WorkerStopped, ErrorKind::Unavailable)]
    #[case(CacheErrorKind::Rejected("disk full".to_string()), ErrorKind::Worker("disk full".to_string()))]
    #[case(CacheErrorKind::Network, ErrorKind::Worker("network unreachable".to_string()))]
    fn worker_errors_are_translated(#[case] cache: CacheErrorKind, #[case] expected: ErrorKind) {
        let result: CacheResult<()> = Err(exn::Exn::from(cache));
        assert_eq!(*from_worker(result).unwrap_err(), expected);
    }

    #[test]
    fn timeouts_are_distinct_from_failures() {
        assert_ne!(ErrorKind::Timeout.to_string(), ErrorKind::Worker("x".to_string()).to_string());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Unavailable.is_retryable());
    }
}
