//! layer_download and layer_cancel tool implementations.
//!
//! Downloads run in the background by default; progress goes to the log and
//! the job can be stopped with layer_cancel. With `wait` the call returns the
//! final report instead.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tilesync_client::{DownloadReport, OfflineCache};
use tilesync_core::LayerDescriptor;

use crate::error::ToolError;
use crate::jobs::DownloadTracker;
use crate::tools::{json_result, log_progress};

/// Input parameters for the layer_download tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerDownloadParams {
    #[serde(flatten)]
    pub layer: LayerDescriptor,

    /// Wait for the job to finish and return its report (default: false).
    #[serde(default)]
    pub wait: bool,
}

/// Output of the layer_download and vector_cache tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DownloadOutput {
    pub namespace: String,
    /// True when the job was left running in the background.
    pub background: bool,
    /// Final report, present when the call waited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DownloadReport>,
}

/// Input parameters for the layer_cancel tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerCancelParams {
    /// Namespace of the job, e.g. `overlay-demo_3` or `vector-cache`.
    pub namespace: String,
}

/// Output of the layer_cancel tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LayerCancelOutput {
    pub namespace: String,
    /// Running and queued jobs that were signalled.
    pub cancelled: usize,
}

pub async fn download_impl(
    cache: &Arc<OfflineCache>, tracker: &Arc<DownloadTracker>, params: LayerDownloadParams,
) -> Result<CallToolResult, McpError> {
    params.layer.validate()?;
    let job = tracker.begin(&params.layer.namespace());
    let namespace = job.namespace().to_string();

    if params.wait {
        let report = cache
            .download(&params.layer, Some(log_progress()), job.token())
            .await?;
        return json_result(&DownloadOutput { namespace, background: false, report: Some(report) });
    }

    // Registered before spawning so the layer reads as loading right away.
    let ticket = cache.register_download(&params.layer)?;
    let cache = cache.clone();
    let layer = params.layer;
    tokio::spawn(async move {
        match cache
            .download_registered(ticket, &layer, Some(log_progress()), job.token())
            .await
        {
            Ok(report) => tracing::info!(namespace = %job.namespace(), state = ?report.state, "background download finished"),
            Err(e) => tracing::warn!(namespace = %job.namespace(), error = %e, "background download failed"),
        }
    });

    json_result(&DownloadOutput { namespace, background: true, report: None })
}

pub async fn cancel_impl(tracker: &DownloadTracker, params: LayerCancelParams) -> Result<CallToolResult, McpError> {
    if params.namespace.trim().is_empty() {
        return Err(ToolError::InvalidInput("namespace cannot be empty".into()).into());
    }

    let cancelled = tracker.cancel(&params.namespace);
    if cancelled == 0 {
        return Err(ToolError::JobNotFound(params.namespace).into());
    }

    tracing::info!(namespace = %params.namespace, cancelled, "download cancelled");
    json_result(&LayerCancelOutput { namespace: params.namespace, cancelled })
}
