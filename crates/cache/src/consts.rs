use std::time::Duration;

/// Version tag compiled into the worker; names the core cache.
pub const WORKER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CORE_CACHE_PREFIX: &str = "folio-core-";
pub const MANUAL_CACHE_PREFIX: &str = "manual-";

/// Metadata entry of a cache, stored beside (not among) its resources.
pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const ENTRIES_DIR: &str = "entries";

pub const LANDING_PAGE: &str = "index.html";
pub const VERSION_DESCRIPTOR: &str = "version.json";
pub const IMAGE_SEGMENT: &str = "/images/";

/// Shell resources precached on install.
pub const DEFAULT_CORE_FILES: &[&str] = &["index.html", "manifest.json", "css/style.css", "js/app.js"];

/// Files every manual cache holds besides its page images.
pub(crate) const MANUAL_CORE_FILES: &[&str] = &["index.html", "search_index.json", "toc.json"];

pub const DEFAULT_FETCH_CONCURRENCY: usize = 6;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Queue depth of the worker's request channel.
pub(crate) const REQUEST_QUEUE_DEPTH: usize = 32;
