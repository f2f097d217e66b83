//! Network side of tilesync.
//!
//! This crate provides the HTTP fetch seam, the session token, manifest and
//! style readers, reconciliation, the bulk downloader and the
//! [`OfflineCache`] service object used by the server.

pub mod download;
pub mod engine;
pub mod fetch;
pub mod manifest;
pub mod reconcile;
pub mod session;
pub mod vector;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use download::{
    BulkDownloader, DownloadOptions, DownloadProgress, DownloadReport, JobRegistry, JobState, JobTicket,
    ProgressCallback,
};
pub use engine::{EngineConfig, OfflineCache};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, HttpSource};
pub use manifest::ManifestReader;
pub use reconcile::{LayerReport, Reconciler};
pub use session::Session;

pub use tokio_util::sync::CancellationToken;
