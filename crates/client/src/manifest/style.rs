//! Vector style and TileJSON documents, reduced to what tile discovery needs.

use std::collections::BTreeMap;

use serde::Deserialize;

/// A style document; only its `sources` map is read.
#[derive(Debug, Deserialize)]
pub struct StyleDocument {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceDecl>,
}

/// A style source: either a bare TileJSON URL or an inline declaration.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceDecl {
    Reference(String),
    Inline(InlineSource),
}

#[derive(Debug, Deserialize)]
pub struct InlineSource {
    /// TileJSON reference.
    pub url: Option<String>,
    /// Array of URLs which can contain placeholders like {x}, {y}, {z}.
    #[serde(default)]
    pub tiles: Vec<String>,
}

impl SourceDecl {
    /// TileJSON URL to follow, if the source is declared by reference.
    pub fn tilejson_url(&self) -> Option<&str> {
        match self {
            SourceDecl::Reference(url) => Some(url),
            SourceDecl::Inline(inline) if inline.tiles.is_empty() => inline.url.as_deref(),
            SourceDecl::Inline(_) => None,
        }
    }

    /// First inline tile template.
    pub fn inline_template(&self) -> Option<&str> {
        match self {
            SourceDecl::Inline(inline) => inline.tiles.first().map(String::as_str),
            SourceDecl::Reference(_) => None,
        }
    }
}

/// TileJSON document.
#[derive(Debug, Deserialize)]
pub struct TileJson {
    #[serde(default)]
    pub tiles: Vec<String>,
}
