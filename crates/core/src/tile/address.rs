//! Tile URL codec.
//!
//! Tiles are addressed as `<base>/<z>/<x>/<y>.<format>`. Parsing is strict:
//! anything that does not match is an error rather than a default address.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

static TILE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)/(\d+)/(\d+)/(\d+)\.(\w+)$").expect("tile URL pattern is valid"));

/// Placeholder path every layer URL template must contain.
pub const TEMPLATE_PLACEHOLDER: &str = "/{z}/{x}/{y}";

/// A single tile decomposed into its base URL, coordinates and format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub base_url: String,
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub format: String,
}

impl TileAddress {
    /// Parse a tile URL.
    ///
    /// Group 1 of the pattern is everything before the `/z/x/y.ext` suffix,
    /// scheme and host included.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let caps = TILE_URL
            .captures(url)
            .ok_or_else(|| Error::TileParse(url.to_string()))?;

        let int = |i: usize| -> Result<u32, Error> {
            caps[i]
                .parse::<u32>()
                .map_err(|e| Error::TileParse(format!("{url}: {e}")))
        };

        Ok(Self {
            base_url: caps[1].to_string(),
            z: int(2)?,
            x: int(3)?,
            y: int(4)?,
            format: caps[5].to_string(),
        })
    }

    /// Serialize back to `<base>/<z>/<x>/<y>.<format>`.
    pub fn to_url(&self) -> String {
        self.to_string()
    }

    pub fn coord(&self) -> TileCoord {
        TileCoord { z: self.z, x: self.x, y: self.y }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}.{}", self.base_url, self.z, self.x, self.y, self.format)
    }
}

/// Zoom/column/row triple, ordered by `(z, x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Fill `{z}`, `{x}` and `{y}` placeholders of a URL template.
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

/// Strip the `/{z}/{x}/{y}...` suffix from a layer template to get its root.
///
/// Absolute (`http`-prefixed) templates are kept as they are; relative ones
/// are resolved against `origin`.
pub fn resolve_base(template: &str, origin: &Url) -> Result<Url, Error> {
    let idx = template
        .find(TEMPLATE_PLACEHOLDER)
        .ok_or_else(|| Error::InvalidTemplate(template.to_string()))?;
    let base = &template[..idx];

    if base.starts_with("http") {
        Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))
    } else {
        origin
            .join(base)
            .map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))
    }
}

/// Extension following `{y}.` in a layer template, without any query string.
pub fn template_format(template: &str) -> Result<String, Error> {
    let idx = template
        .find(TEMPLATE_PLACEHOLDER)
        .ok_or_else(|| Error::InvalidTemplate(template.to_string()))?;
    let rest = &template[idx + TEMPLATE_PLACEHOLDER.len()..];
    let ext = rest
        .strip_prefix('.')
        .map(|s| s.split(['?', '#']).next().unwrap_or_default())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .ok_or_else(|| Error::InvalidTemplate(format!("{template}: missing tile extension")))?;

    Ok(ext.to_string())
}
