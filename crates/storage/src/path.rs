//! Path validation.
//!
//! Cache keys are derived from request URLs, which are attacker-influenced
//! strings as far as the storage root is concerned. Every path handed to a
//! backend goes through [`validate`] first.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns it normalized.
///
/// The result never escapes the storage root: `..` may only cancel out a
/// component that was already pushed, `.` and repeated separators vanish, and
/// a leading `/` is ignored. Null bytes and Windows prefixes are rejected, as
/// is anything that normalizes to the empty path.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use folio_storage::validate_path;
/// assert!(validate_path("manual-a/entries/manuals/a/index.html").is_ok());
/// assert!(validate_path("/manuals/a/images/page_001.jpg").is_ok());
/// assert!(validate_path("manuals/../index.html").is_ok());
/// assert!(validate_path("../offline_manuals.json").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("manuals/./a//images/../index.html/").unwrap(),
///     Path::new("manuals/a/index.html")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
