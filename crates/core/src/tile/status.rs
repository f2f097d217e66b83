//! Offline availability of a layer.

use serde::{Deserialize, Serialize};

/// Whether a layer is usable offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
    /// Every tile listed by the manifest is cached.
    Cached,
    /// Nothing cached yet.
    NotCached,
    /// Some, but not all, tiles cached.
    Partly,
    /// A download job for the layer is running or queued.
    Loading,
    /// Remote manifest empty or unreachable.
    Error,
}

impl CacheStatus {
    /// Classify from the three reconciliation counts.
    ///
    /// Precedence is part of the contract: a zero-remote layer is `Error`
    /// even when it could be read as vacuously cached.
    pub fn classify(remote: usize, cached: usize, missing: usize) -> Self {
        if remote == 0 {
            CacheStatus::Error
        } else if missing == 0 {
            CacheStatus::Cached
        } else if cached == 0 {
            CacheStatus::NotCached
        } else {
            CacheStatus::Partly
        }
    }
}
