//! Core types and shared functionality for tilesync.
//!
//! This crate provides:
//! - Tile URL codec and the layer/namespace/status model
//! - Namespaced tile cache with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod tile;

pub use cache::{CacheDb, CacheHandle, CachedTile, NamespaceInfo};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use tile::{CacheStatus, LayerDescriptor, TileAddress, TileCoord};
