//! Per-layer tools: status, inspection, downloads and generation cleanup.

pub mod download;
pub mod reset;
pub mod status;

pub use download::{LayerCancelParams, LayerDownloadParams, cancel_impl, download_impl};
pub use reset::{purge_stale_impl, reset_impl};
pub use status::{LayerInspectParams, inspect_impl, status_impl};
