//! Reconciliation of a layer's remote manifest against its cache namespace.

use std::collections::HashSet;

use serde::Serialize;

use crate::manifest::ManifestReader;
use tilesync_core::{CacheDb, CacheStatus, Error, LayerDescriptor};

/// Remote, cached and missing tile sets of one layer generation.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub layer_id: String,
    pub namespace: String,
    pub remote: Vec<String>,
    pub cached: Vec<String>,
    pub missing: Vec<String>,
    pub status: CacheStatus,
}

impl LayerReport {
    fn new(layer: &LayerDescriptor, remote: Vec<String>, cached: Vec<String>) -> Self {
        let missing = missing(&remote, &cached);
        let status = CacheStatus::classify(remote.len(), cached.len(), missing.len());
        Self { layer_id: layer.id.clone(), namespace: layer.namespace(), remote, cached, missing, status }
    }
}

/// `remote` minus `cached`, by exact cache-key string, in remote order.
pub fn missing(remote: &[String], cached: &[String]) -> Vec<String> {
    let cached: HashSet<&str> = cached.iter().map(String::as_str).collect();
    remote
        .iter()
        .filter(|url| !cached.contains(url.as_str()))
        .cloned()
        .collect()
}

#[derive(Clone)]
pub struct Reconciler {
    db: CacheDb,
    reader: ManifestReader,
}

impl Reconciler {
    pub fn new(db: CacheDb, reader: ManifestReader) -> Self {
        Self { db, reader }
    }

    pub fn reader(&self) -> &ManifestReader {
        &self.reader
    }

    /// Keys stored in the namespace of `layer`'s current generation.
    pub async fn cached_tiles(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        let handle = self.db.open_namespace(&layer.namespace()).await?;
        self.db.keys(&handle).await
    }

    pub async fn missing_tiles(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        Ok(self.inspect(layer).await?.missing)
    }

    /// Fetch the remote manifest and read the namespace concurrently, then diff.
    pub async fn inspect(&self, layer: &LayerDescriptor) -> Result<LayerReport, Error> {
        let (remote, cached) = tokio::join!(self.reader.list_remote_tiles(layer), self.cached_tiles(layer));
        let report = LayerReport::new(layer, remote?, cached?);

        tracing::debug!(
            layer = %layer.id,
            remote = report.remote.len(),
            cached = report.cached.len(),
            missing = report.missing.len(),
            status = ?report.status,
            "layer reconciled"
        );

        Ok(report)
    }

    pub async fn status(&self, layer: &LayerDescriptor) -> Result<CacheStatus, Error> {
        Ok(self.inspect(layer).await?.status)
    }

    /// Drop the namespace of `layer`'s current generation.
    pub async fn reset_layer_cache(&self, layer: &LayerDescriptor) -> Result<bool, Error> {
        let deleted = self.db.delete_namespace(&layer.namespace()).await?;
        tracing::info!(layer = %layer.id, namespace = %layer.namespace(), deleted, "layer cache reset");
        Ok(deleted)
    }
}
