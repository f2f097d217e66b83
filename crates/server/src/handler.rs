//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tilesync_client::OfflineCache;
use tilesync_core::LayerDescriptor;

use crate::jobs::DownloadTracker;
use crate::tools::cache::{CacheClearParams, clear_impl, namespaces_impl};
use crate::tools::layer::{
    LayerCancelParams, LayerDownloadParams, LayerInspectParams, cancel_impl, download_impl, inspect_impl,
    purge_stale_impl, reset_impl, status_impl,
};
use crate::tools::session::{SessionSetTokenParams, set_token_impl};
use crate::tools::vector::{VectorCacheParams, VectorTilesParams, cache_impl, tiles_impl};

/// The main MCP server handler for tilesync.
#[derive(Clone)]
pub struct McpTileServer {
    tool_router: ToolRouter<Self>,
    cache: Arc<OfflineCache>,
    tracker: Arc<DownloadTracker>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl McpTileServer {
    /// Create a new server handler around a shared engine.
    pub fn new(cache: Arc<OfflineCache>) -> Self {
        Self { tool_router: Self::tool_router(), cache, tracker: DownloadTracker::new() }
    }

    #[tool(
        description = "Offline status of a layer generation: cached, notCached, partly, loading or error (remote manifest empty or unreachable)."
    )]
    async fn layer_status(&self, params: Parameters<LayerDescriptor>) -> Result<CallToolResult, McpError> {
        status_impl(&self.cache, params.0).await
    }

    #[tool(description = "Reconcile a layer against its remote manifest. Returns remote, cached and missing tile counts.")]
    async fn layer_inspect(&self, params: Parameters<LayerInspectParams>) -> Result<CallToolResult, McpError> {
        inspect_impl(&self.cache, params.0).await
    }

    /// Start downloading the missing tiles of a layer.
    ///
    /// Runs in the background unless `wait` is set.
    #[tool(
        description = "Download the missing tiles of a layer in batches. Runs in the background unless wait=true; stop it with layer_cancel."
    )]
    async fn layer_download(&self, params: Parameters<LayerDownloadParams>) -> Result<CallToolResult, McpError> {
        download_impl(&self.cache, &self.tracker, params.0).await
    }

    #[tool(description = "Cancel the running and queued download jobs of a namespace. Already downloaded tiles are kept.")]
    async fn layer_cancel(&self, params: Parameters<LayerCancelParams>) -> Result<CallToolResult, McpError> {
        cancel_impl(&self.tracker, params.0).await
    }

    #[tool(description = "Delete the cached tiles of one layer generation.")]
    async fn layer_reset(&self, params: Parameters<LayerDescriptor>) -> Result<CallToolResult, McpError> {
        reset_impl(&self.cache, params.0).await
    }

    #[tool(description = "Delete every cached generation of a layer except the given version.")]
    async fn layer_purge_stale(&self, params: Parameters<LayerDescriptor>) -> Result<CallToolResult, McpError> {
        purge_stale_impl(&self.cache, params.0).await
    }

    #[tool(description = "List the distinct z/x/y coordinates cached across all overlays, up to a max zoom.")]
    async fn vector_tiles(&self, params: Parameters<VectorTilesParams>) -> Result<CallToolResult, McpError> {
        tiles_impl(&self.cache, params.0).await
    }

    #[tool(
        description = "Download the background vector tiles under every cached overlay into vector-cache, using the sources of a style document."
    )]
    async fn vector_cache(&self, params: Parameters<VectorCacheParams>) -> Result<CallToolResult, McpError> {
        cache_impl(&self.cache, &self.tracker, params.0).await
    }

    #[tool(description = "List cache namespaces with tile counts and stored bytes.")]
    async fn cache_namespaces(&self) -> Result<CallToolResult, McpError> {
        namespaces_impl(&self.cache).await
    }

    #[tool(description = "Delete one namespace, or all namespaces when none is given. Requires confirm=true.")]
    async fn cache_clear(&self, params: Parameters<CacheClearParams>) -> Result<CallToolResult, McpError> {
        clear_impl(&self.cache, params.0).await
    }

    #[tool(description = "Replace the access token sent with overlay requests. Cached tiles stay valid.")]
    async fn session_set_token(&self, params: Parameters<SessionSetTokenParams>) -> Result<CallToolResult, McpError> {
        set_token_impl(&self.cache, params.0).await
    }
}

impl ServerHandler for McpTileServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tilesync".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Offline tile cache. Check a layer with layer_status, fill it with layer_download, then \
                 vector_cache to fetch the basemap underneath."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
