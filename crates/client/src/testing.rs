//! In-memory [`HttpSource`] used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::fetch::{FetchResponse, HttpSource};
use tilesync_core::Error;

#[derive(Clone)]
enum Route {
    Body(Bytes),
    Status(u16),
    Hang,
}

/// Serves fixed bodies by exact request URL; everything else is a 404.
#[derive(Default)]
pub struct StaticSource {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn body(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.set_body(url, body);
        self
    }

    pub fn json(self, url: &str, value: serde_json::Value) -> Self {
        self.body(url, value.to_string())
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Status(status));
        self
    }

    /// Requests to `url` never complete.
    pub fn hang(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Hang);
        self
    }

    pub fn set_body(&self, url: &str, body: impl Into<Bytes>) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Body(body.into()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl HttpSource for StaticSource {
    async fn get(&self, url: &str) -> Result<FetchResponse, Error> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let route = self.routes.lock().unwrap().get(url).cloned();

        match route.unwrap_or(Route::Status(404)) {
            Route::Body(bytes) => Ok(FetchResponse {
                status: StatusCode::OK,
                content_type: Some("application/octet-stream".into()),
                bytes,
                fetch_ms: 0,
            }),
            Route::Status(status) => Err(Error::HttpStatus { url: url.to_string(), status }),
            Route::Hang => std::future::pending().await,
        }
    }
}
