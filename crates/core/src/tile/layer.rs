//! Overlay layers and the cache namespaces derived from them.

use serde::{Deserialize, Serialize};
use url::Url;

use super::address::{TEMPLATE_PLACEHOLDER, resolve_base, template_format};
use crate::Error;

/// Prefix shared by every overlay generation namespace (and the scratch one).
pub const OVERLAY_PREFIX: &str = "overlay-";

/// Shared namespace for background/vector tiles.
pub const VECTOR_NAMESPACE: &str = "vector-cache";

/// Scratch namespace where download batches are staged before promotion.
pub const SCRATCH_NAMESPACE: &str = "overlay-tmp";

/// A cacheable overlay as described by the backend.
///
/// `version` is opaque; a bump means "new layer" and maps to a new namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LayerDescriptor {
    /// Layer identifier.
    pub id: String,
    /// Tile URL template containing `{z}/{x}/{y}`, e.g. `https://host/overlays/demo/{z}/{x}/{y}.png`.
    pub url_template: String,
    /// Backend generation counter.
    pub version: i64,
}

impl LayerDescriptor {
    pub fn new(id: impl Into<String>, url_template: impl Into<String>, version: i64) -> Self {
        Self { id: id.into(), url_template: url_template.into(), version }
    }

    /// Namespace holding exactly this `(id, version)` generation.
    pub fn namespace(&self) -> String {
        overlay_namespace(&self.id, self.version)
    }

    /// Check the descriptor is usable before any I/O happens.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("layer id cannot be empty".into()));
        }
        if !self.url_template.contains(TEMPLATE_PLACEHOLDER) {
            return Err(Error::InvalidTemplate(self.url_template.clone()));
        }
        template_format(&self.url_template).map(|_| ())
    }

    /// Tile format (extension) of this layer.
    pub fn tile_format(&self) -> Result<String, Error> {
        template_format(&self.url_template)
    }

    /// Root URL of the layer, i.e. the template without its `{z}/{x}/{y}` suffix.
    pub fn base_url(&self, origin: &Url) -> Result<Url, Error> {
        resolve_base(&self.url_template, origin)
    }

    /// `{base}/index.json`, without any access token.
    pub fn manifest_url(&self, origin: &Url) -> Result<String, Error> {
        let base = self.base_url(origin)?;
        Ok(format!("{}/index.json", base.as_str().trim_end_matches('/')))
    }
}

/// `overlay-{id}_{version}`.
pub fn overlay_namespace(id: &str, version: i64) -> String {
    format!("{OVERLAY_PREFIX}{id}_{version}")
}

/// True for per-layer generation namespaces (the scratch namespace is excluded).
pub fn is_overlay_namespace(name: &str) -> bool {
    name.starts_with(OVERLAY_PREFIX) && name != SCRATCH_NAMESPACE
}

/// Version encoded in `name` if it is a generation namespace of layer `id`.
pub fn generation_of(name: &str, id: &str) -> Option<i64> {
    name.strip_prefix(OVERLAY_PREFIX)?
        .strip_prefix(id)?
        .strip_prefix('_')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> LayerDescriptor {
        LayerDescriptor::new("demo", "https://host/overlays/demo/{z}/{x}/{y}.png", 3)
    }

    #[test]
    fn test_namespace_naming() {
        assert_eq!(demo().namespace(), "overlay-demo_3");
        assert_ne!(LayerDescriptor { version: 4, ..demo() }.namespace(), demo().namespace());
    }

    #[test]
    fn test_overlay_namespace_detection() {
        assert!(is_overlay_namespace("overlay-demo_3"));
        assert!(!is_overlay_namespace(SCRATCH_NAMESPACE));
        assert!(!is_overlay_namespace(VECTOR_NAMESPACE));
    }

    #[test]
    fn test_generation_of() {
        assert_eq!(generation_of("overlay-demo_3", "demo"), Some(3));
        assert_eq!(generation_of("overlay-demo_-1", "demo"), Some(-1));
        assert_eq!(generation_of("overlay-demo_x_3", "demo"), None);
        assert_eq!(generation_of("overlay-demo2_3", "demo"), None);
        assert_eq!(generation_of("vector-cache", "demo"), None);
    }

    #[test]
    fn test_manifest_url() {
        let origin = Url::parse("https://app.example").unwrap();
        assert_eq!(demo().manifest_url(&origin).unwrap(), "https://host/overlays/demo/index.json");

        let relative = LayerDescriptor::new("rel", "/overlays/rel/{z}/{x}/{y}.jpg", 1);
        assert_eq!(relative.manifest_url(&origin).unwrap(), "https://app.example/overlays/rel/index.json");
    }

    #[test]
    fn test_validate() {
        assert!(demo().validate().is_ok());
        assert!(matches!(LayerDescriptor { id: " ".into(), ..demo() }.validate(), Err(Error::InvalidInput(_))));
        assert!(matches!(
            LayerDescriptor { url_template: "https://host/demo.png".into(), ..demo() }.validate(),
            Err(Error::InvalidTemplate(_))
        ));
    }
}
