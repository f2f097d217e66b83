//! SQLite-backed, namespaced tile cache.
//!
//! This module provides a persistent URL-addressed blob store using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named namespaces (one per layer generation, plus shared ones)
//! - Whole-blob upserts and existence checks that do not read the blob
//! - Single-statement namespace deletion for version invalidation
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod key;
pub mod migrations;
pub mod tiles;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::{blob_digest, cache_key, staging_key};
pub use tiles::{CacheHandle, CachedTile, NamespaceInfo};
