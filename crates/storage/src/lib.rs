//! Durable storage for folio.
//!
//! Everything the offline cache persists (cached resources, cache metadata,
//! the local mirror of offline manuals) goes through a [`StorageBackend`].
//! Backends only deal in relative paths and raw bytes; interpretation is
//! left to the crates on top.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
