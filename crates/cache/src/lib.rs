//! Offline cache worker.
//!
//! The worker is the only writer of the durable caches. It runs as its own
//! task and is driven by messages, so the foreground never touches cache
//! storage directly and simultaneous UI actions cannot lose each other's
//! updates.
//!
//! # Architecture
//! - [`Worker`]: owns the caches; handles `cache-manual`, `remove-manual`,
//!   `get-offline-manuals`, `check-version` and `skip-waiting`.
//! - [`WorkerHandle`]: the foreground's connection, one reply channel per
//!   request and a response timeout.
//! - [`Registration`]: install/activate lifecycle of worker versions.
//! - [`Interceptor`]: cache-or-network policy for resource fetches.
//! - [`network`]: the transport the worker fetches through.

mod consts;
pub mod error;
mod handle;
mod intercept;
pub mod network;
mod protocol;
mod registration;
mod store;
mod worker;

pub use crate::consts::{
    CORE_CACHE_PREFIX, DEFAULT_CORE_FILES, DEFAULT_FETCH_CONCURRENCY, DEFAULT_RESPONSE_TIMEOUT, IMAGE_SEGMENT,
    LANDING_PAGE, MANUAL_CACHE_PREFIX, VERSION_DESCRIPTOR, WORKER_VERSION,
};
pub use crate::handle::WorkerHandle;
pub use crate::intercept::Interceptor;
pub use crate::protocol::{ManualRecord, Request, Response, VersionCheck};
pub use crate::registration::{Lifecycle, Registration};
pub use crate::store::CacheStore;
pub use crate::worker::{Worker, WorkerConfig, manual_cache_name, manual_core_files};
