//! vector_tiles and vector_cache tool implementations.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tilesync_client::OfflineCache;
use tilesync_core::TileCoord;
use tilesync_core::tile::VECTOR_NAMESPACE;

use crate::jobs::DownloadTracker;
use crate::tools::json_result;
use crate::tools::layer::download::DownloadOutput;
use crate::tools::log_progress;

/// Input parameters for the vector_tiles tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct VectorTilesParams {
    /// Highest zoom to include (default: configured vector_max_zoom).
    #[serde(default)]
    pub max_zoom: Option<u32>,

    /// Include the coordinate list, not only its size.
    #[serde(default)]
    pub include_coords: bool,
}

/// Output of the vector_tiles tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct VectorTilesOutput {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Vec<TileCoord>>,
}

/// Input parameters for the vector_cache tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct VectorCacheParams {
    /// Style document listing the vector sources (default: configured style_url).
    #[serde(default)]
    pub style_url: Option<String>,

    /// Highest zoom to fetch (default: configured vector_max_zoom).
    #[serde(default)]
    pub max_zoom: Option<u32>,

    /// Wait for the job to finish and return its report (default: false).
    #[serde(default)]
    pub wait: bool,
}

pub async fn tiles_impl(cache: &OfflineCache, params: VectorTilesParams) -> Result<CallToolResult, McpError> {
    let coords = cache.derive_vector_tile_set(params.max_zoom).await?;
    let output = VectorTilesOutput { count: coords.len(), coords: params.include_coords.then_some(coords) };
    json_result(&output)
}

pub async fn cache_impl(
    cache: &Arc<OfflineCache>, tracker: &Arc<DownloadTracker>, params: VectorCacheParams,
) -> Result<CallToolResult, McpError> {
    let job = tracker.begin(VECTOR_NAMESPACE);

    if params.wait {
        let report = cache
            .cache_vector_for_overlays(params.style_url.as_deref(), params.max_zoom, Some(log_progress()), job.token())
            .await?;
        return json_result(&DownloadOutput {
            namespace: VECTOR_NAMESPACE.to_string(),
            background: false,
            report: Some(report),
        });
    }

    if params.style_url.is_none() && cache.config().style_url.is_none() {
        return Err(tilesync_core::Error::InvalidInput("no style URL given or configured".into()).into());
    }

    let cache = cache.clone();
    tokio::spawn(async move {
        let result = cache
            .cache_vector_for_overlays(params.style_url.as_deref(), params.max_zoom, Some(log_progress()), job.token())
            .await;
        match result {
            Ok(report) => tracing::info!(namespace = %job.namespace(), state = ?report.state, "vector download finished"),
            Err(e) => tracing::warn!(namespace = %job.namespace(), error = %e, "vector download failed"),
        }
    });

    json_result(&DownloadOutput { namespace: VECTOR_NAMESPACE.to_string(), background: true, report: None })
}
