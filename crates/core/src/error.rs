//! Unified error types for tilesync.
//!
//! The `Display` prefix of each variant is a stable code that tool callers
//! can match on.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the tile cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty layer id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL does not match `<base>/<z>/<x>/<y>.<format>`.
    #[error("TILE_PARSE: {0}")]
    TileParse(String),

    /// Layer URL template lacks the `{z}/{x}/{y}` placeholder path.
    #[error("INVALID_TEMPLATE: {0}")]
    InvalidTemplate(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Underlying persistent store failed. Never means "tile absent".
    #[error("CACHE_STORE_ERROR: {0}")]
    CacheStore(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Transport-level failure (offline, DNS, TLS, timeout).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Non-2xx HTTP response.
    #[error("HTTP_ERROR: status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A tile inside a download batch could not be fetched.
    #[error("TILE_FETCH_FAILED: {url}: {reason}")]
    TileFetch { url: String, reason: String },

    /// Operation was cancelled by the caller.
    #[error("CANCELLED")]
    Cancelled,
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::CacheStore(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::CacheStore(tokio_rusqlite::Error::Close(c)),
            _ => Error::CacheStore(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::CacheStore(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::CacheStore(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::TileParse(_) => -32003,
            Error::InvalidTemplate(_) => -32003,
            Error::InvalidUrl(_) => -32003,
            Error::CacheStore(_) | Error::MigrationFailed(_) => -32002,
            Error::Network(_) => -32008,
            Error::HttpStatus { .. } => -32008,
            Error::FetchTooLarge(_) => -32007,
            Error::TileFetch { .. } => -32009,
            Error::Cancelled => -32010,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
