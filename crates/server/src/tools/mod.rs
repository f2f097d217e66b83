//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tilesync server. Each tool
//! returns its output as pretty-printed JSON text content.

pub mod cache;
pub mod layer;
pub mod session;
pub mod vector;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use tilesync_client::{DownloadProgress, ProgressCallback};

use crate::error::ToolError;

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Serialize(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Progress callback that turns job events into log records.
pub(crate) fn log_progress() -> ProgressCallback {
    std::sync::Arc::new(|p: DownloadProgress| {
        if p.state.is_terminal() {
            tracing::info!(
                namespace = %p.namespace,
                completed = p.completed,
                total = p.total,
                state = ?p.state,
                "download finished"
            );
        } else {
            tracing::debug!(namespace = %p.namespace, completed = p.completed, total = p.total, "download progress");
        }
    })
}
