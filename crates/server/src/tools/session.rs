//! session_set_token tool implementation.
//!
//! Replaces the access token used for overlay requests. Cache keys never
//! contain the token, so cached tiles stay valid across rotations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tilesync_client::OfflineCache;

use crate::tools::json_result;

/// Input parameters for the session_set_token tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSetTokenParams {
    /// New access token. Omit or pass an empty string to clear it.
    #[serde(default)]
    pub token: Option<String>,
}

/// Output of the session_set_token tool. The token itself is never echoed.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionSetTokenOutput {
    pub has_token: bool,
}

pub async fn set_token_impl(cache: &OfflineCache, params: SessionSetTokenParams) -> Result<CallToolResult, McpError> {
    cache.session().set_access_token(params.token).await;
    let has_token = cache.session().access_token().await.is_some();
    json_result(&SessionSetTokenOutput { has_token })
}
