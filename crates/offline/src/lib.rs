//! Foreground side of offline manuals.
//!
//! The [`Coordinator`] is the application's single entry point for making
//! manuals available offline. It talks to the cache worker only through its
//! message protocol and keeps a small local mirror of the offline set so the
//! first render does not have to wait for the worker.

pub mod error;
mod catalog;
mod coordinator;
mod mirror;

pub use crate::catalog::{
    CatalogConfig, DEFAULT_PROBE_CONCURRENCY, DEFAULT_PROBE_PAGES, FileListOrigin, ManualCatalog, ManualDescriptor,
    ManualSource, artifact_path,
};
pub use crate::coordinator::{
    CONSTRAINED_READINESS_TIMEOUT, Coordinator, CoordinatorConfig, CoordinatorEvent, DEFAULT_READINESS_TIMEOUT,
    DEFAULT_RECONNECT_CHECK_DELAY, DEFAULT_UPDATE_COOLDOWN, NetworkStatus, OfflineSnapshot, SkipReason, Toggled,
    UpdateStatus,
};
pub use crate::mirror::{DEFAULT_MIRROR_KEY, StorageMirror};
