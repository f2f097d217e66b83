//! cache_clear tool implementation.
//!
//! Drops one namespace, or every namespace when none is named.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tilesync_client::OfflineCache;

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Namespace to drop. Omit to drop every namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Must be true; clearing cannot be undone.
    #[serde(default)]
    pub confirm: bool,
}

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheClearOutput {
    /// Number of namespaces deleted.
    pub deleted: u64,
}

pub async fn clear_impl(cache: &OfflineCache, params: CacheClearParams) -> Result<CallToolResult, McpError> {
    if !params.confirm {
        return Err(ToolError::InvalidInput("confirm must be true to clear the cache".into()).into());
    }

    let deleted = match params.namespace.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(ToolError::InvalidInput("namespace cannot be empty".into()).into());
        }
        Some(name) => u64::from(cache.delete_namespace(name).await?),
        None => cache.clear_all().await?,
    };

    json_result(&CacheClearOutput { deleted })
}
