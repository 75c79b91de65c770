#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use mixboard::application::catalog::CatalogService;
use mixboard::application::pages::CatalogPages;
use mixboard::application::provider::{MusicProvider, ProviderError};
use mixboard::application::session::{CatalogSession, SessionOptions};
use mixboard::domain::entities::{ExternalPlaylistSnapshot, PlaylistSummary, TrackSnapshot};
use mixboard::infra::http::{self, ApiState, HttpState, RouterState};
use mixboard::infra::memory::InMemoryCatalog;
use mixboard::regen::PageScheduler;
use tower::ServiceExt;

pub const KNOWN_EXTERNAL_ID: &str = "abc123";

/// Serves one playlist and records every search it receives.
#[derive(Default)]
pub struct FakeProvider {
    pub searches: Mutex<Vec<(String, usize)>>,
}

impl FakeProvider {
    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MusicProvider for FakeProvider {
    async fn fetch_playlist(
        &self,
        external_id: &str,
    ) -> Result<ExternalPlaylistSnapshot, ProviderError> {
        if external_id != KNOWN_EXTERNAL_ID {
            return Err(ProviderError::NotFound {
                external_id: external_id.to_string(),
            });
        }
        Ok(ExternalPlaylistSnapshot {
            external_id: external_id.to_string(),
            name: "Friday Mix (live)".to_string(),
            image_url: Some("https://img.example/abc123.jpg".to_string()),
            external_url: Some("https://open.example/playlist/abc123".to_string()),
            tracks: vec![TrackSnapshot {
                position: 1,
                title: "Opening Night".to_string(),
                artists: vec!["The Examples".to_string()],
                duration_ms: 201_000,
            }],
        })
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistSummary>, ProviderError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), limit));
        Ok(vec![PlaylistSummary {
            external_id: KNOWN_EXTERNAL_ID.to_string(),
            name: format!("{query} hits"),
            thumbnail_url: None,
        }])
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub scheduler: PageScheduler,
}

impl TestApp {
    pub fn new() -> Self {
        let provider = Arc::new(FakeProvider::default());
        let dyn_provider: Arc<dyn MusicProvider> = provider.clone();
        let catalog = CatalogService::new(Arc::new(InMemoryCatalog::new()));
        let pages = CatalogPages::new(catalog.clone(), Arc::clone(&dyn_provider), 4);
        let scheduler = PageScheduler::new(Arc::new(pages), Duration::from_secs(300));
        let session = Arc::new(CatalogSession::new(
            catalog.clone(),
            Arc::clone(&dyn_provider),
            SessionOptions {
                search_quiet: Duration::from_millis(300),
                search_limit: 8,
            },
        ));

        let state = RouterState {
            http: HttpState {
                scheduler: scheduler.clone(),
                catalog: catalog.clone(),
            },
            api: ApiState {
                catalog,
                session,
                provider: dyn_provider,
                scheduler: scheduler.clone(),
            },
        };

        Self {
            router: http::build_router(state),
            provider,
            scheduler,
        }
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
