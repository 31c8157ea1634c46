//! Metadata about stored files, as returned by listing operations.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
        }
    }

    /// First path component, which is how callers group files into
    /// top-level namespaces (one directory per cache).
    pub fn root_component(&self) -> Option<&str> {
        self.path.components().next().and_then(|c| c.as_os_str().to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_component_is_first_directory() {
        let info = FileInfo::new("manual-a/entries/manuals/a/index.html", 3, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.root_component(), Some("manual-a"));
        let info = FileInfo::new("offline_manuals.json", 2, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.root_component(), Some("offline_manuals.json"));
    }
}
