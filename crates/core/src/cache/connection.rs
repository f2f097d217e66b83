//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Tile cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning shares the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::CacheStore(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::CacheStore(e.into()))?;
        Self::init(conn).await
    }

    /// Close the background connection.
    ///
    /// Every clone shares the connection, so calls through other clones fail
    /// with a store error afterwards.
    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::CacheStore)
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::CacheStore)?;

        migrations::run(&conn).await?;

        tracing::debug!("tile cache database ready");

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let fk: i64 = db
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get::<_, i64>(0)))
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_closed_clone_reports_store_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let other = db.clone();
        db.close().await.unwrap();

        let result = other.open_namespace("overlay-demo_1").await;
        assert!(matches!(result, Err(Error::CacheStore(_))));
    }

    #[tokio::test]
    async fn test_open_file_reopens_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.sqlite");

        let db = CacheDb::open(&path).await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        db.put(&handle, "https://host/1/0/0.png", b"tile", None).await.unwrap();
        drop(db);

        let db = CacheDb::open(&path).await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        assert!(db.has(&handle, "https://host/1/0/0.png").await.unwrap());
    }
}
