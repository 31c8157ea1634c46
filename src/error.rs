//! Binary Error Types
//!
//! Library errors are wrapped with their kind cloned into the top frame, so
//! the message shown to the user is the one the library chose.

use derive_more::{Display, Error};
use folio_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use folio_config::error::{Error as ConfigError, ErrorKind as ConfigErrorKind};
use folio_offline::error::{Error as OfflineError, ErrorKind as OfflineErrorKind};
use folio_storage::error::Error as StorageError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("{_0}")]
    Config(#[error(not(source))] ConfigErrorKind),
    #[display("storage unavailable: {_0}")]
    Storage(#[error(not(source))] String),
    #[display("{_0}")]
    Cache(#[error(not(source))] CacheErrorKind),
    #[display("{_0}")]
    Offline(#[error(not(source))] OfflineErrorKind),
}

impl ErrorKind {
    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Config(inner))
    }

    #[track_caller]
    pub fn storage(err: StorageError) -> Error {
        let reason = (*err).to_string();
        err.raise(ErrorKind::Storage(reason))
    }

    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Cache(inner))
    }

    #[track_caller]
    pub fn offline(err: OfflineError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Offline(inner))
    }
}
