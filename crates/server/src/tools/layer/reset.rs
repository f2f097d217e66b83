//! layer_reset and layer_purge_stale tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;
use tilesync_client::OfflineCache;
use tilesync_core::LayerDescriptor;

use crate::tools::json_result;

/// Output of the layer_reset tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LayerResetOutput {
    pub namespace: String,
    /// False when nothing was cached for this generation.
    pub deleted: bool,
}

/// Output of the layer_purge_stale tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LayerPurgeOutput {
    /// Namespace that was kept.
    pub current: String,
    /// Namespaces of older (or newer) generations that were deleted.
    pub purged: Vec<String>,
}

pub async fn reset_impl(cache: &OfflineCache, layer: LayerDescriptor) -> Result<CallToolResult, McpError> {
    layer.validate()?;
    let deleted = cache.reset_layer_cache(&layer).await?;
    json_result(&LayerResetOutput { namespace: layer.namespace(), deleted })
}

pub async fn purge_stale_impl(cache: &OfflineCache, layer: LayerDescriptor) -> Result<CallToolResult, McpError> {
    layer.validate()?;
    let purged = cache.purge_stale_generations(&layer).await?;
    json_result(&LayerPurgeOutput { current: layer.namespace(), purged })
}
