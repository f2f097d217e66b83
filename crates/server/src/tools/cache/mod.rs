//! Cache-wide MCP tools.
//!
//! This module provides tools for listing and clearing cache namespaces.

pub mod clear;
pub mod namespaces;

pub use clear::{CacheClearParams, clear_impl};
pub use namespaces::namespaces_impl;
