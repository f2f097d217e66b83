//! Current session: holder of the access token for overlay requests.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::fetch::with_access_token;
use tilesync_core::Error;

/// Shared, replaceable access token.
///
/// Clones share the same token, so a rotation is seen by every component.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        Self { token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))) }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Replace the token. Cache keys are unaffected.
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.token.write().await = token.filter(|t| !t.is_empty());
        tracing::info!("session access token updated");
    }

    /// Request URL for `url` carrying the current token.
    pub async fn authorize(&self, url: &str) -> Result<String, Error> {
        let token = self.token.read().await;
        with_access_token(url, token.as_deref())
            .map(String::from)
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authorize_appends_token() {
        let session = Session::new(Some("secret".into()));
        let url = session.authorize("https://host/o/index.json").await.unwrap();
        assert_eq!(url, "https://host/o/index.json?accesstoken=secret");
    }

    #[tokio::test]
    async fn test_rotation_visible_to_clones() {
        let session = Session::new(Some("one".into()));
        let clone = session.clone();
        session.set_access_token(Some("two".into())).await;
        assert_eq!(clone.access_token().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_empty_token_is_none() {
        let session = Session::new(Some(String::new()));
        assert!(session.access_token().await.is_none());
        let url = session.authorize("https://host/o/index.json").await.unwrap();
        assert_eq!(url, "https://host/o/index.json");
    }
}
