//! layer_status and layer_inspect tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tilesync_client::OfflineCache;
use tilesync_core::{CacheStatus, LayerDescriptor};

use crate::tools::json_result;

/// Output of the layer_status tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LayerStatusOutput {
    pub layer_id: String,
    /// Cache namespace of this layer generation.
    pub namespace: String,
    pub status: CacheStatus,
}

/// Input parameters for the layer_inspect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayerInspectParams {
    #[serde(flatten)]
    pub layer: LayerDescriptor,

    /// Include the list of missing tile URLs in the output.
    #[serde(default)]
    pub include_missing: bool,
}

/// Output of the layer_inspect tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LayerInspectOutput {
    pub layer_id: String,
    pub namespace: String,
    pub status: CacheStatus,
    /// Tiles listed by the remote manifest.
    pub remote: usize,
    /// Tiles stored in the namespace.
    pub cached: usize,
    /// Remote tiles not yet cached.
    pub missing: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_urls: Option<Vec<String>>,
}

pub async fn status_impl(cache: &OfflineCache, layer: LayerDescriptor) -> Result<CallToolResult, McpError> {
    layer.validate()?;
    let status = cache.status(&layer).await?;

    json_result(&LayerStatusOutput { namespace: layer.namespace(), layer_id: layer.id, status })
}

pub async fn inspect_impl(cache: &OfflineCache, params: LayerInspectParams) -> Result<CallToolResult, McpError> {
    params.layer.validate()?;
    let report = cache.inspect(&params.layer).await?;

    let output = LayerInspectOutput {
        remote: report.remote.len(),
        cached: report.cached.len(),
        missing: report.missing.len(),
        missing_urls: params.include_missing.then_some(report.missing),
        layer_id: report.layer_id,
        namespace: report.namespace,
        status: report.status,
    };

    json_result(&output)
}
