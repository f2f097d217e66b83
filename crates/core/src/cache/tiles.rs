//! Namespaced tile operations.
//!
//! A namespace is an isolated partition of the store. Tiles are keyed by
//! `(namespace, url)`; deleting a namespace removes all of its tiles in one
//! statement through the `ON DELETE CASCADE` foreign key.

use super::connection::CacheDb;
use super::key::{blob_digest, staging_key};
use crate::Error;
use crate::tile::{LayerDescriptor, generation_of};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Handle to an opened namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    name: String,
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A cached tile blob with its metadata.
#[derive(Debug, Clone)]
pub struct CachedTile {
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub digest: String,
    pub stored_at: String,
}

/// Summary of one namespace.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NamespaceInfo {
    pub name: String,
    pub tiles: u64,
    pub bytes: u64,
    pub created_at: String,
}

fn ensure_namespace(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl CacheDb {
    /// Create or reattach to a namespace. Never clears existing contents.
    pub async fn open_namespace(&self, name: &str) -> Result<CacheHandle, Error> {
        if name.is_empty() {
            return Err(Error::InvalidInput("namespace cannot be empty".into()));
        }
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_namespace(conn, &owned) })
            .await
            .map_err(Error::from)?;

        Ok(CacheHandle { name: name.to_string() })
    }

    /// Store a whole tile blob, replacing any entry for the same URL.
    pub async fn put(
        &self, handle: &CacheHandle, url: &str, bytes: &[u8], content_type: Option<&str>,
    ) -> Result<(), Error> {
        let namespace = handle.name.clone();
        let url = url.to_string();
        let digest = blob_digest(bytes);
        let bytes = bytes.to_vec();
        let content_type = content_type.map(str::to_string);
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_namespace(conn, &namespace)?;
                conn.execute(
                    "INSERT INTO tiles (namespace, url, bytes, content_type, size, digest, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(namespace, url) DO UPDATE SET
                        bytes = excluded.bytes,
                        content_type = excluded.content_type,
                        size = excluded.size,
                        digest = excluded.digest,
                        stored_at = excluded.stored_at",
                    params![namespace, url, bytes, content_type, bytes.len() as i64, digest, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a tile by URL.
    ///
    /// Returns None if the URL is not cached in this namespace.
    pub async fn get(&self, handle: &CacheHandle, url: &str) -> Result<Option<CachedTile>, Error> {
        let namespace = handle.name.clone();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedTile>, Error> {
                let result = conn.query_row(
                    "SELECT url, bytes, content_type, digest, stored_at
                     FROM tiles WHERE namespace = ?1 AND url = ?2",
                    params![namespace, url],
                    |row| {
                        Ok(CachedTile {
                            url: row.get(0)?,
                            bytes: row.get(1)?,
                            content_type: row.get(2)?,
                            digest: row.get(3)?,
                            stored_at: row.get(4)?,
                        })
                    },
                );

                match result {
                    Ok(tile) => Ok(Some(tile)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a URL is cached without reading the blob.
    pub async fn has(&self, handle: &CacheHandle, url: &str) -> Result<bool, Error> {
        let namespace = handle.name.clone();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM tiles WHERE namespace = ?1 AND url = ?2)",
                    params![namespace, url],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All URLs cached in the namespace, sorted.
    pub async fn keys(&self, handle: &CacheHandle) -> Result<Vec<String>, Error> {
        let namespace = handle.name.clone();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM tiles WHERE namespace = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![namespace], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of tiles in the namespace.
    pub async fn count(&self, handle: &CacheHandle) -> Result<u64, Error> {
        let namespace = handle.name.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM tiles WHERE namespace = ?1", params![namespace], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Discard a namespace and all its tiles.
    ///
    /// Returns false if the namespace did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List every namespace with its tile count and stored bytes.
    pub async fn namespaces(&self) -> Result<Vec<NamespaceInfo>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<NamespaceInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT n.name, COUNT(t.url), COALESCE(SUM(t.size), 0), n.created_at
                     FROM namespaces n LEFT JOIN tiles t ON t.namespace = n.name
                     GROUP BY n.name ORDER BY n.name",
                )?;
                let infos = stmt
                    .query_map([], |row| {
                        Ok(NamespaceInfo {
                            name: row.get(0)?,
                            tiles: row.get::<_, i64>(1)? as u64,
                            bytes: row.get::<_, i64>(2)? as u64,
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(infos)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a tile in `scratch` on behalf of `target`.
    ///
    /// Staged rows are private to their target; [`CacheDb::promote`] moves
    /// them over.
    pub async fn stage(
        &self, scratch: &CacheHandle, target: &CacheHandle, url: &str, bytes: &[u8], content_type: Option<&str>,
    ) -> Result<(), Error> {
        self.put(scratch, &staging_key(url, &target.name), bytes, content_type)
            .await
    }

    /// Move the tiles staged for `to` under `urls` out of `from`, in a single
    /// transaction.
    ///
    /// Either every listed URL lands in `to` or nothing changes. Fails with
    /// `InvalidInput` if any URL was not staged for `to`.
    pub async fn promote(&self, from: &CacheHandle, to: &CacheHandle, urls: &[String]) -> Result<u64, Error> {
        let from = from.name.clone();
        let to = to.name.clone();
        let urls = urls.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                ensure_namespace(&tx, &to)?;
                let mut moved = 0u64;
                for url in &urls {
                    let staged = staging_key(url, &to);
                    let copied = tx.execute(
                        "INSERT INTO tiles (namespace, url, bytes, content_type, size, digest, stored_at)
                         SELECT ?1, ?4, bytes, content_type, size, digest, stored_at
                         FROM tiles WHERE namespace = ?2 AND url = ?3
                         ON CONFLICT(namespace, url) DO UPDATE SET
                            bytes = excluded.bytes,
                            content_type = excluded.content_type,
                            size = excluded.size,
                            digest = excluded.digest,
                            stored_at = excluded.stored_at",
                        params![to, from, staged, url],
                    )?;
                    if copied == 0 {
                        return Err(Error::InvalidInput(format!("{url} is not staged in {from} for {to}")));
                    }
                    tx.execute("DELETE FROM tiles WHERE namespace = ?1 AND url = ?2", params![from, staged])?;
                    moved += 1;
                }
                tx.commit()?;
                Ok(moved)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation namespace of `layer` other than its current version.
    ///
    /// Returns the names of deleted namespaces.
    pub async fn purge_stale_generations(&self, layer: &LayerDescriptor) -> Result<Vec<String>, Error> {
        let current = layer.namespace();
        let stale: Vec<String> = self
            .namespaces()
            .await?
            .into_iter()
            .map(|info| info.name)
            .filter(|name| *name != current && generation_of(name, &layer.id).is_some())
            .collect();

        for name in &stale {
            self.delete_namespace(name).await?;
        }

        Ok(stale)
    }

    /// Drop every namespace.
    ///
    /// Returns the number of deleted namespaces.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM namespaces", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: &str = "https://host/overlays/demo/5/3/7.png";

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();

        db.put(&handle, TILE, b"png-bytes", Some("image/png")).await.unwrap();

        let tile = db.get(&handle, TILE).await.unwrap().unwrap();
        assert_eq!(tile.bytes, b"png-bytes");
        assert_eq!(tile.content_type.as_deref(), Some("image/png"));
        assert_eq!(tile.digest, blob_digest(b"png-bytes"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();

        db.put(&handle, TILE, b"old", None).await.unwrap();
        db.put(&handle, TILE, b"new", None).await.unwrap();

        assert_eq!(db.get(&handle, TILE).await.unwrap().unwrap().bytes, b"new");
        assert_eq!(db.count(&handle).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        assert!(db.get(&handle, TILE).await.unwrap().is_none());
        assert!(!db.has(&handle, TILE).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        db.put(&handle, TILE, b"x", None).await.unwrap();

        let again = db.open_namespace("overlay-demo_1").await.unwrap();
        assert_eq!(handle, again);
        assert!(db.has(&again, TILE).await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open_namespace("overlay-demo_1").await.unwrap();
        let v2 = db.open_namespace("overlay-demo_2").await.unwrap();

        db.put(&v1, TILE, b"x", None).await.unwrap();

        assert!(db.has(&v1, TILE).await.unwrap());
        assert!(!db.has(&v2, TILE).await.unwrap());
        assert!(db.keys(&v2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        db.put(&handle, "https://host/o/5/3/8.png", b"b", None).await.unwrap();
        db.put(&handle, "https://host/o/5/3/7.png", b"a", None).await.unwrap();

        let keys = db.keys(&handle).await.unwrap();
        assert_eq!(keys, vec!["https://host/o/5/3/7.png", "https://host/o/5/3/8.png"]);
    }

    #[tokio::test]
    async fn test_delete_namespace_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        db.put(&handle, TILE, b"x", None).await.unwrap();

        assert!(db.delete_namespace("overlay-demo_1").await.unwrap());
        assert!(!db.delete_namespace("overlay-demo_1").await.unwrap());
        assert!(db.keys(&handle).await.unwrap().is_empty());
        assert!(db.namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_listing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let a = db.open_namespace("overlay-a_1").await.unwrap();
        db.open_namespace("vector-cache").await.unwrap();
        db.put(&a, "https://h/1/0/0.png", b"abc", None).await.unwrap();
        db.put(&a, "https://h/1/0/1.png", b"de", None).await.unwrap();

        let infos = db.namespaces().await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "overlay-a_1");
        assert_eq!(infos[0].tiles, 2);
        assert_eq!(infos[0].bytes, 5);
        assert_eq!(infos[1].name, "vector-cache");
        assert_eq!(infos[1].tiles, 0);
    }

    #[tokio::test]
    async fn test_promote_moves_batch() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let tmp = db.open_namespace("overlay-tmp").await.unwrap();
        let target = db.open_namespace("overlay-demo_1").await.unwrap();
        db.stage(&tmp, &target, TILE, b"x", Some("image/png")).await.unwrap();

        let moved = db.promote(&tmp, &target, &[TILE.to_string()]).await.unwrap();
        assert_eq!(moved, 1);
        let tile = db.get(&target, TILE).await.unwrap().unwrap();
        assert_eq!(tile.url, TILE);
        assert_eq!(tile.content_type.as_deref(), Some("image/png"));
        assert_eq!(db.count(&tmp).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_promote_is_all_or_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let tmp = db.open_namespace("overlay-tmp").await.unwrap();
        let target = db.open_namespace("overlay-demo_1").await.unwrap();
        db.stage(&tmp, &target, TILE, b"x", None).await.unwrap();

        let urls = vec![TILE.to_string(), "https://host/overlays/demo/5/3/8.png".to_string()];
        let result = db.promote(&tmp, &target, &urls).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!db.has(&target, TILE).await.unwrap());
        assert_eq!(db.count(&tmp).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_staged_rows_are_private_to_their_target() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let tmp = db.open_namespace("overlay-tmp").await.unwrap();
        let a = db.open_namespace("overlay-a_1").await.unwrap();
        let b = db.open_namespace("overlay-b_1").await.unwrap();
        db.stage(&tmp, &a, TILE, b"for-a", None).await.unwrap();
        db.stage(&tmp, &b, TILE, b"for-b", None).await.unwrap();

        assert_eq!(db.promote(&tmp, &a, &[TILE.to_string()]).await.unwrap(), 1);
        assert_eq!(db.promote(&tmp, &b, &[TILE.to_string()]).await.unwrap(), 1);

        assert_eq!(db.get(&a, TILE).await.unwrap().unwrap().bytes, b"for-a");
        assert_eq!(db.get(&b, TILE).await.unwrap().unwrap().bytes, b"for-b");
        assert_eq!(db.count(&tmp).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_stale_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in ["overlay-demo_1", "overlay-demo_2", "overlay-demo_3", "overlay-demo2_1", "vector-cache"] {
            db.open_namespace(name).await.unwrap();
        }

        let layer = LayerDescriptor::new("demo", "https://host/overlays/demo/{z}/{x}/{y}.png", 3);
        let deleted = db.purge_stale_generations(&layer).await.unwrap();
        assert_eq!(deleted, vec!["overlay-demo_1", "overlay-demo_2"]);

        let remaining: Vec<String> = db.namespaces().await.unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(remaining, vec!["overlay-demo2_1", "overlay-demo_3", "vector-cache"]);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_namespace("overlay-demo_1").await.unwrap();
        db.put(&handle, TILE, b"x", None).await.unwrap();
        db.open_namespace("vector-cache").await.unwrap();

        assert_eq!(db.clear_all().await.unwrap(), 2);
        assert!(db.namespaces().await.unwrap().is_empty());
        assert!(!db.has(&handle, TILE).await.unwrap());
    }
}
