//! Remote manifest and style readers.
//!
//! A layer publishes `{base}/index.json` shaped as `{z: {x: [y, ...]}}`. The
//! reader expands it into tile URLs (cache keys, so never carrying the access
//! token). Reads are best-effort: a transport failure, non-2xx status or
//! malformed document degrades to an empty result with a warning, which the
//! reconciler then reports as [`CacheStatus::Error`](tilesync_core::CacheStatus).

pub mod style;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::fetch::HttpSource;
use crate::session::Session;
use style::{StyleDocument, TileJson};
use tilesync_core::{Error, LayerDescriptor, TileCoord};

/// Reads layer manifests and vector style sources.
#[derive(Clone)]
pub struct ManifestReader {
    http: Arc<dyn HttpSource>,
    session: Session,
    origin: Url,
}

impl ManifestReader {
    pub fn new(http: Arc<dyn HttpSource>, session: Session, origin: Url) -> Self {
        Self { http, session, origin }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Every tile URL the remote manifest of `layer` lists.
    ///
    /// Ordered by numeric z, then numeric x, then y in manifest order, with
    /// duplicates removed. Only an unusable descriptor is an error.
    pub async fn list_remote_tiles(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        layer.validate()?;
        let base = layer.base_url(&self.origin)?;
        let format = layer.tile_format()?;
        let manifest_url = layer.manifest_url(&self.origin)?;
        let request_url = self.session.authorize(&manifest_url).await?;

        let response = match self.http.get(&request_url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(layer = %layer.id, url = %manifest_url, error = %e, "manifest fetch failed");
                return Ok(Vec::new());
            }
        };

        let doc: Value = match serde_json::from_slice(&response.bytes) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(layer = %layer.id, url = %manifest_url, error = %e, "manifest is not valid JSON");
                return Ok(Vec::new());
            }
        };

        match expand_manifest(&doc, base.as_str(), &format) {
            Ok(urls) => {
                tracing::debug!(layer = %layer.id, tiles = urls.len(), "manifest read");
                Ok(urls)
            }
            Err(e) => {
                tracing::warn!(layer = %layer.id, url = %manifest_url, error = %e, "malformed manifest");
                Ok(Vec::new())
            }
        }
    }

    /// Vector tile templates keyed by style source id.
    ///
    /// Sources referencing a TileJSON document are resolved through it;
    /// sources with inline `tiles` use their first entry. Sources with no
    /// tiles at all (geojson, image, ...) are skipped.
    pub async fn list_vector_sources(&self, style_url: &str) -> Result<BTreeMap<String, String>, Error> {
        let style_url = Url::parse(style_url).map_err(|e| Error::InvalidUrl(format!("{style_url}: {e}")))?;
        let mut templates = BTreeMap::new();

        let style: StyleDocument = match self.fetch_json(style_url.as_str()).await {
            Ok(style) => style,
            Err(e) => {
                tracing::warn!(url = %style_url, error = %e, "style fetch failed");
                return Ok(templates);
            }
        };

        for (id, source) in &style.sources {
            let (template, doc_url) = if let Some(template) = source.inline_template() {
                (template.to_string(), style_url.clone())
            } else if let Some(reference) = source.tilejson_url() {
                let tilejson_url = match style_url.join(reference) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::warn!(source = %id, reference, error = %e, "invalid TileJSON reference");
                        continue;
                    }
                };
                let tilejson: TileJson = match self.fetch_json(tilejson_url.as_str()).await {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!(source = %id, url = %tilejson_url, error = %e, "TileJSON fetch failed");
                        continue;
                    }
                };
                let Some(first) = tilejson.tiles.into_iter().next() else {
                    tracing::warn!(source = %id, url = %tilejson_url, "TileJSON lists no tiles");
                    continue;
                };
                (first, tilejson_url)
            } else {
                continue;
            };

            match absolute_template(&template, &doc_url) {
                Some(template) => {
                    templates.insert(id.clone(), template);
                }
                None => tracing::warn!(source = %id, template, "skipping relative tile template"),
            }
        }

        Ok(templates)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self.http.get(url).await?;
        serde_json::from_slice(&response.bytes).map_err(|e| Error::InvalidInput(format!("{url}: {e}")))
    }
}

/// Expand a `{z: {x: [y, ...]}}` manifest into tile URLs under `base`.
///
/// The innermost level may be an array or an object; in the latter case its
/// values are the y indices.
pub fn expand_manifest(doc: &Value, base: &str, format: &str) -> Result<Vec<String>, Error> {
    let base = base.trim_end_matches('/');
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (z, columns) in numeric_entries(doc, "zoom level")? {
        for (x, rows) in numeric_entries(columns, "column")? {
            let ys: Vec<&Value> = match rows {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => map.values().collect(),
                other => return Err(malformed(format!("rows of {z}/{x} must be a list, got {other}"))),
            };
            for y in ys {
                let y = index_value(y)?;
                if seen.insert(TileCoord::new(z, x, y)) {
                    urls.push(format!("{base}/{z}/{x}/{y}.{format}"));
                }
            }
        }
    }

    Ok(urls)
}

/// Object entries with integer keys, sorted numerically.
fn numeric_entries<'a>(value: &'a Value, level: &str) -> Result<Vec<(u32, &'a Value)>, Error> {
    let Value::Object(map) = value else {
        return Err(malformed(format!("{level} map must be an object")));
    };
    let mut entries = map
        .iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|n| (n, v))
                .map_err(|_| malformed(format!("{level} key {k:?} is not an integer")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|(n, _)| *n);
    Ok(entries)
}

fn index_value(value: &Value) -> Result<u32, Error> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| malformed(format!("row index {value} is not an integer")))
}

fn malformed(reason: String) -> Error {
    Error::InvalidInput(format!("malformed manifest: {reason}"))
}

/// Make a tile template absolute relative to the document that declared it.
///
/// Templates are not run through `Url::parse`, which would percent-encode the
/// `{z}/{x}/{y}` braces. Root-relative templates get the document's scheme and
/// authority; anything else relative is unsupported.
fn absolute_template(template: &str, doc_url: &Url) -> Option<String> {
    if template.starts_with("http://") || template.starts_with("https://") {
        return Some(template.to_string());
    }
    if template.starts_with('/') && !template.starts_with("//") {
        let host = doc_url.host_str()?;
        let authority = match doc_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        return Some(format!("{}://{authority}{template}", doc_url.scheme()));
    }
    None
}
