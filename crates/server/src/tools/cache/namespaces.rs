//! cache_namespaces tool implementation.
//!
//! Lists every namespace with its tile count and stored bytes.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;
use tilesync_client::OfflineCache;
use tilesync_core::NamespaceInfo;

use crate::tools::json_result;

/// Output of the cache_namespaces tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheNamespacesOutput {
    pub namespaces: Vec<NamespaceInfo>,
    pub total_tiles: u64,
    pub total_bytes: u64,
}

pub async fn namespaces_impl(cache: &OfflineCache) -> Result<CallToolResult, McpError> {
    let namespaces = cache.namespaces().await?;
    let total_tiles = namespaces.iter().map(|n| n.tiles).sum();
    let total_bytes = namespaces.iter().map(|n| n.bytes).sum();

    json_result(&CacheNamespacesOutput { namespaces, total_tiles, total_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{cache_with, demo_layer, demo_source, output};
    use tilesync_client::CancellationToken;

    #[tokio::test]
    async fn test_namespaces_empty() {
        let cache = cache_with(demo_source()).await;
        let out = output(&namespaces_impl(&cache).await.unwrap());
        assert_eq!(out["namespaces"], serde_json::json!([]));
        assert_eq!(out["total_tiles"], 0);
    }

    #[tokio::test]
    async fn test_namespaces_after_download() {
        let cache = cache_with(demo_source()).await;
        cache
            .download(&demo_layer(), None, CancellationToken::new())
            .await
            .unwrap();

        let out = output(&namespaces_impl(&cache).await.unwrap());
        let names: Vec<&str> = out["namespaces"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["name"].as_str())
            .collect();
        assert!(names.contains(&"overlay-demo_1"));
        assert_eq!(out["total_tiles"], 4);
        // four "png" bodies
        assert_eq!(out["total_bytes"], 12);
    }
}
