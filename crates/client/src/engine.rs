//! The offline cache service object.
//!
//! [`OfflineCache`] wires the store, the manifest reader, the reconciler and
//! the downloader together behind plain request/response methods. It is
//! constructed explicitly and shared by `Arc`; nothing in this crate is a
//! global.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::download::{BulkDownloader, DownloadOptions, DownloadReport, JobRegistry, JobTicket, ProgressCallback};
use crate::fetch::{FetchClient, FetchConfig, HttpSource};
use crate::manifest::ManifestReader;
use crate::reconcile::{LayerReport, Reconciler};
use crate::session::Session;
use crate::vector;
use tilesync_core::{AppConfig, CacheDb, CacheStatus, Error, LayerDescriptor, NamespaceInfo, TileCoord};

/// Engine settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Origin that relative layer templates resolve against.
    pub origin: Url,
    pub concurrency: usize,
    pub batch_delay: Duration,
    pub style_url: Option<String>,
    pub vector_max_zoom: u32,
    /// Query parameters removed from cache keys.
    pub ephemeral_params: Vec<String>,
}

impl TryFrom<&AppConfig> for EngineConfig {
    type Error = Error;

    fn try_from(config: &AppConfig) -> Result<Self, Error> {
        let origin =
            Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin {}: {e}", config.origin)))?;
        Ok(Self {
            origin,
            concurrency: config.concurrency,
            batch_delay: config.batch_delay(),
            style_url: config.style_url.clone(),
            vector_max_zoom: config.vector_max_zoom,
            ephemeral_params: config.ephemeral_params.clone(),
        })
    }
}

impl EngineConfig {
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions { concurrency: self.concurrency, batch_delay: self.batch_delay }
    }
}

#[derive(Clone)]
pub struct OfflineCache {
    db: CacheDb,
    session: Session,
    reconciler: Reconciler,
    downloader: BulkDownloader,
    config: EngineConfig,
}

impl OfflineCache {
    pub fn new(db: CacheDb, http: Arc<dyn HttpSource>, session: Session, config: EngineConfig) -> Self {
        let reader = ManifestReader::new(http.clone(), session.clone(), config.origin.clone());
        let reconciler = Reconciler::new(db.clone(), reader);
        let downloader = BulkDownloader::new(
            db.clone(),
            http,
            session.clone(),
            reconciler.clone(),
            JobRegistry::new(),
            config.ephemeral_params.clone(),
        );
        Self { db, session, reconciler, downloader, config }
    }

    /// Open the store and HTTP client described by `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let engine_config = EngineConfig::try_from(config)?;
        let db = CacheDb::open(&config.db_path).await?;
        let http = FetchClient::new(FetchConfig::from(config))?;
        let session = Session::new(config.access_token.clone());

        tracing::info!(db_path = %config.db_path.display(), origin = %engine_config.origin, "offline cache ready");

        Ok(Self::new(db, Arc::new(http), session, engine_config))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True while a download job for `layer` is running or queued.
    pub fn is_loading(&self, layer: &LayerDescriptor) -> bool {
        self.downloader.jobs().is_active(&layer.namespace())
    }

    pub async fn status(&self, layer: &LayerDescriptor) -> Result<CacheStatus, Error> {
        if self.is_loading(layer) {
            return Ok(CacheStatus::Loading);
        }
        self.reconciler.status(layer).await
    }

    /// Full reconciliation report; `status` is `Loading` while a job runs.
    pub async fn inspect(&self, layer: &LayerDescriptor) -> Result<LayerReport, Error> {
        let mut report = self.reconciler.inspect(layer).await?;
        if self.is_loading(layer) {
            report.status = CacheStatus::Loading;
        }
        Ok(report)
    }

    pub async fn cached_tiles(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        self.reconciler.cached_tiles(layer).await
    }

    pub async fn missing_tiles(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        self.reconciler.missing_tiles(layer).await
    }

    /// Download the missing tiles of `layer` with the configured batch settings.
    pub async fn download(
        &self, layer: &LayerDescriptor, on_progress: Option<ProgressCallback>, cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let options = self.config.download_options();
        self.downloader.download(layer, &options, on_progress, cancel).await
    }

    /// Reserve a download job for `layer` so it reports `Loading` before the
    /// job itself gets to run.
    pub fn register_download(&self, layer: &LayerDescriptor) -> Result<JobTicket, Error> {
        self.downloader.register(layer)
    }

    /// Run a download reserved with [`OfflineCache::register_download`].
    pub async fn download_registered(
        &self, ticket: JobTicket, layer: &LayerDescriptor, on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let options = self.config.download_options();
        self.downloader
            .download_registered(ticket, layer, &options, on_progress, cancel)
            .await
    }

    pub async fn reset_layer_cache(&self, layer: &LayerDescriptor) -> Result<bool, Error> {
        self.reconciler.reset_layer_cache(layer).await
    }

    /// Delete every generation of `layer` except its current version.
    pub async fn purge_stale_generations(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        let purged = self.db.purge_stale_generations(layer).await?;
        if !purged.is_empty() {
            tracing::info!(layer = %layer.id, purged = ?purged, "stale generations purged");
        }
        Ok(purged)
    }

    pub async fn derive_vector_tile_set(&self, max_zoom: Option<u32>) -> Result<Vec<TileCoord>, Error> {
        vector::derive_vector_tile_set(&self.db, max_zoom.unwrap_or(self.config.vector_max_zoom)).await
    }

    /// Cache the vector tiles under all cached overlays.
    ///
    /// Falls back to the configured style URL when `style_url` is `None`.
    pub async fn cache_vector_for_overlays(
        &self, style_url: Option<&str>, max_zoom: Option<u32>, on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let style_url = style_url
            .or_else(|| self.config.style_url.as_deref())
            .ok_or_else(|| Error::InvalidInput("no style URL given or configured".into()))?;
        let max_zoom = max_zoom.unwrap_or(self.config.vector_max_zoom);
        let options = self.config.download_options();

        vector::cache_vector_for_overlays(&self.downloader, style_url, max_zoom, &options, on_progress, cancel).await
    }

    pub async fn namespaces(&self) -> Result<Vec<NamespaceInfo>, Error> {
        self.db.namespaces().await
    }

    /// Drop one namespace by name.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let deleted = self.db.delete_namespace(name).await?;
        tracing::info!(namespace = name, deleted, "namespace deleted");
        Ok(deleted)
    }

    pub async fn clear_all(&self) -> Result<u64, Error> {
        let cleared = self.db.clear_all().await?;
        tracing::info!(namespaces = cleared, "cache cleared");
        Ok(cleared)
    }

    /// Close the store. Every clone of this engine stops working.
    pub async fn close(&self) -> Result<(), Error> {
        self.db.clone().close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadProgress, JobState};
    use crate::testing::StaticSource;
    use serde_json::json;

    const MANIFEST: &str = "https://host/overlays/demo/index.json";

    fn layer() -> LayerDescriptor {
        LayerDescriptor::new("demo", "https://host/overlays/demo/{z}/{x}/{y}.png", 1)
    }

    fn tile(y: u32) -> String {
        format!("https://host/overlays/demo/5/3/{y}.png")
    }

    fn config() -> EngineConfig {
        EngineConfig {
            origin: Url::parse("http://localhost").unwrap(),
            concurrency: 4,
            batch_delay: Duration::ZERO,
            style_url: Some("https://maps.example/style.json".into()),
            vector_max_zoom: 14,
            ephemeral_params: vec!["accesstoken".into()],
        }
    }

    fn demo_source() -> StaticSource {
        let mut source = StaticSource::new()
            .json(&format!("{MANIFEST}?accesstoken=secret"), json!({"5": {"3": [0, 1, 2, 3, 4, 5, 6, 7]}}))
            .json(
                "https://maps.example/style.json",
                json!({"sources": {"base": {"type": "vector", "tiles": ["https://tiles.example/{z}/{x}/{y}.pbf"]}}}),
            );
        for y in 0..8 {
            source = source
                .body(&format!("{}?accesstoken=secret", tile(y)), "png")
                .body(&format!("https://tiles.example/5/3/{y}.pbf"), "pbf");
        }
        source
    }

    async fn engine(source: StaticSource) -> (OfflineCache, Arc<StaticSource>) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let source = Arc::new(source);
        let cache = OfflineCache::new(db, source.clone(), Session::new(Some("secret".into())), config());
        (cache, source)
    }

    #[test]
    fn test_engine_config_from_app_config() {
        let app = AppConfig { concurrency: 3, batch_delay_ms: 10, ..Default::default() };
        let config = EngineConfig::try_from(&app).unwrap();
        assert_eq!(config.origin.as_str(), "http://localhost/");
        assert_eq!(config.download_options().concurrency, 3);
        assert_eq!(config.download_options().batch_delay, Duration::from_millis(10));
        assert_eq!(config.ephemeral_params, vec!["accesstoken".to_string()]);
    }

    #[test]
    fn test_engine_config_bad_origin() {
        let app = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(EngineConfig::try_from(&app), Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_not_cached_partly_cached() {
        let (cache, _) = engine(demo_source()).await;
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::NotCached);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let stop_after_first_batch: ProgressCallback = Arc::new(move |p: DownloadProgress| {
            if p.state == JobState::Running {
                trigger.cancel();
            }
        });
        let report = cache
            .download(&layer(), Some(stop_after_first_batch), cancel)
            .await
            .unwrap();
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(report.downloaded, 4);
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Partly);

        let report = cache
            .download(&layer(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, JobState::Completed);
        assert_eq!((report.downloaded, report.total), (4, 4));
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Cached);
        assert_eq!(cache.cached_tiles(&layer()).await.unwrap().len(), 8);
        assert!(cache.missing_tiles(&layer()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registered_download_is_loading_before_it_runs() {
        let (cache, _) = engine(demo_source()).await;

        let ticket = cache.register_download(&layer()).unwrap();
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Loading);

        let report = cache
            .download_registered(ticket, &layer(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, JobState::Completed);
        assert!(!cache.is_loading(&layer()));
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Cached);
    }

    #[tokio::test]
    async fn test_registered_ticket_must_match_layer() {
        let (cache, _) = engine(demo_source()).await;
        let ticket = cache.register_download(&layer()).unwrap();
        let other = LayerDescriptor { version: 2, ..layer() };

        let result = cache
            .download_registered(ticket, &other, None, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!cache.is_loading(&layer()));
    }

    #[tokio::test]
    async fn test_loading_while_job_runs() {
        let source = demo_source().hang(&format!("{}?accesstoken=secret", tile(0)));
        let (cache, _) = engine(source).await;
        let cancel = CancellationToken::new();

        let job = {
            let cache = cache.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.download(&layer(), None, cancel).await })
        };

        while !cache.is_loading(&layer()) {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Loading);
        assert_eq!(cache.inspect(&layer()).await.unwrap().status, CacheStatus::Loading);

        cancel.cancel();
        let report = job.await.unwrap().unwrap();
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::NotCached);
    }

    #[tokio::test]
    async fn test_vector_cache_uses_configured_style() {
        let (cache, source) = engine(demo_source()).await;
        cache
            .download(&layer(), None, CancellationToken::new())
            .await
            .unwrap();

        let coords = cache.derive_vector_tile_set(None).await.unwrap();
        assert_eq!(coords.len(), 8);

        let report = cache
            .cache_vector_for_overlays(None, None, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.downloaded, 8);
        assert!(
            source
                .requests()
                .iter()
                .filter(|u| u.starts_with("https://tiles.example/"))
                .all(|u| !u.contains("accesstoken"))
        );

        let names: Vec<String> = cache.namespaces().await.unwrap().into_iter().map(|n| n.name).collect();
        assert!(names.contains(&"vector-cache".to_string()));
        assert!(names.contains(&"overlay-demo_1".to_string()));
    }

    #[tokio::test]
    async fn test_vector_cache_without_style() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = EngineConfig { style_url: None, ..config() };
        let cache = OfflineCache::new(db, Arc::new(StaticSource::new()), Session::default(), config);

        let result = cache
            .cache_vector_for_overlays(None, None, None, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_token_rotation_keeps_cache_valid() {
        let (cache, _) = engine(demo_source()).await;
        cache
            .download(&layer(), None, CancellationToken::new())
            .await
            .unwrap();

        cache.session().set_access_token(Some("rotated".into())).await;
        // manifest is only served for the old token, so the layer reads as unreachable
        assert_eq!(cache.status(&layer()).await.unwrap(), CacheStatus::Error);
        assert_eq!(cache.cached_tiles(&layer()).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_purge_and_clear() {
        let (cache, _) = engine(demo_source()).await;
        cache
            .download(&layer(), None, CancellationToken::new())
            .await
            .unwrap();

        let next = LayerDescriptor { version: 2, ..layer() };
        assert_eq!(cache.purge_stale_generations(&next).await.unwrap(), vec!["overlay-demo_1"]);
        assert!(cache.purge_stale_generations(&next).await.unwrap().is_empty());

        cache.cached_tiles(&next).await.unwrap();
        assert!(!cache.reset_layer_cache(&layer()).await.unwrap());
        assert!(cache.clear_all().await.unwrap() >= 1);
        assert!(cache.namespaces().await.unwrap().is_empty());
    }
}
