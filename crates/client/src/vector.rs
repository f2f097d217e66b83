//! Background vector tiles for cached overlays.
//!
//! Every tile cached for any overlay generation needs the basemap tile at the
//! same z/x/y underneath it to be useful offline.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tokio_util::sync::CancellationToken;

use crate::download::{BulkDownloader, DownloadOptions, DownloadReport, ProgressCallback};
use tilesync_core::tile::{VECTOR_NAMESPACE, is_overlay_namespace};
use tilesync_core::{CacheDb, Error, TileAddress, TileCoord};

/// Distinct coordinates cached in any overlay namespace, up to `max_zoom`.
pub async fn derive_vector_tile_set(db: &CacheDb, max_zoom: u32) -> Result<Vec<TileCoord>, Error> {
    let mut coords = BTreeSet::new();

    for info in db.namespaces().await? {
        if !is_overlay_namespace(&info.name) {
            continue;
        }
        let handle = db.open_namespace(&info.name).await?;
        for key in db.keys(&handle).await? {
            let path = key.split(['?', '#']).next().unwrap_or_default();
            match TileAddress::parse(path) {
                Ok(address) if address.z <= max_zoom => {
                    coords.insert(address.coord());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(namespace = %info.name, key, error = %e, "skipping unparseable cache key"),
            }
        }
    }

    Ok(coords.into_iter().collect())
}

/// Every `template × coord` URL, without duplicates.
pub fn vector_urls(coords: &[TileCoord], templates: &BTreeMap<String, String>) -> Vec<String> {
    let mut seen = HashSet::new();
    coords
        .iter()
        .flat_map(|coord| templates.values().map(move |template| coord.substitute(template)))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Download the vector tiles under every cached overlay into `vector-cache`.
///
/// Vector requests never carry the overlay access token.
pub async fn cache_vector_for_overlays(
    downloader: &BulkDownloader, style_url: &str, max_zoom: u32, options: &DownloadOptions,
    on_progress: Option<ProgressCallback>, cancel: CancellationToken,
) -> Result<DownloadReport, Error> {
    let coords = derive_vector_tile_set(downloader.db(), max_zoom).await?;
    let templates = if coords.is_empty() {
        BTreeMap::new()
    } else {
        downloader.reader().list_vector_sources(style_url).await?
    };
    let urls = vector_urls(&coords, &templates);

    tracing::info!(coords = coords.len(), sources = templates.len(), urls = urls.len(), "vector tiles derived");

    downloader
        .download_urls(VECTOR_NAMESPACE, &urls, false, options, on_progress, cancel)
        .await
}
