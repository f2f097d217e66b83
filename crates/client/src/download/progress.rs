//! Download job options, progress events and reports.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Phase of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Snapshot emitted after every batch, plus once with a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub namespace: String,
    pub completed: usize,
    pub total: usize,
    pub state: JobState,
}

/// Progress observer. Called from the downloading task, so it must not block.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Outcome of a finished (or cancelled) job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct DownloadReport {
    pub namespace: String,
    /// Tiles promoted into the namespace by this job.
    pub downloaded: usize,
    /// Size of the missing set the job started from.
    pub total: usize,
    pub state: JobState,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Tiles fetched per batch (default: 10)
    pub concurrency: usize,
    /// Pause between batches (default: 50ms)
    pub batch_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self { concurrency: 10, batch_delay: Duration::from_millis(50) }
    }
}

impl DownloadOptions {
    /// Batch size, never zero.
    pub fn batch_size(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DownloadOptions::default();
        assert_eq!(options.concurrency, 10);
        assert_eq!(options.batch_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let options = DownloadOptions { concurrency: 0, ..Default::default() };
        assert_eq!(options.batch_size(), 1);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        assert_eq!(serde_json::to_string(&JobState::Cancelled).unwrap(), "\"cancelled\"");
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
