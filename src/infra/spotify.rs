//! Spotify Web API client.
//!
//! Reads playlists and searches through the public catalogue endpoints.
//! When credentials are configured an app token is obtained with the
//! client-credentials grant and reused until shortly before it expires.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use metrics::counter;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    application::provider::{MusicProvider, ProviderError},
    config::{ProviderCredentials, ProviderSettings},
    domain::entities::{ExternalPlaylistSnapshot, PlaylistSummary, TrackSnapshot},
};

use super::{error::InfraError, telemetry::PROVIDER_REQUEST_TOTAL};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

pub struct SpotifyClient {
    client: Client,
    api_base: Url,
    accounts_base: Url,
    credentials: Option<ProviderCredentials>,
    token: RwLock<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl SpotifyClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(InfraError::provider)?;

        Ok(Self {
            client,
            api_base: settings.api_base.clone(),
            accounts_base: settings.accounts_base.clone(),
            credentials: settings.credentials.clone(),
            token: RwLock::new(None),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("mixboard/", env!("CARGO_PKG_VERSION"))
    }

    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Protocol(format!("`{base}` cannot be a base url")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        match self.access_token().await? {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Ok(request),
        }
    }

    async fn access_token(&self) -> Result<Option<String>, ProviderError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        if let Some(value) = valid_token(self.token.read().await.as_ref()) {
            return Ok(Some(value));
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(value) = valid_token(slot.as_ref()) {
            return Ok(Some(value));
        }

        let token = self.request_token(credentials).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(Some(value))
    }

    async fn request_token(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<AccessToken, ProviderError> {
        let url = Self::endpoint(&self.accounts_base, &["api", "token"])?;
        let basic = STANDARD.encode(format!(
            "{}:{}",
            credentials.client_id, credentials.client_secret
        ));
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .finish();

        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, format!("Basic {basic}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let grant: TokenGrant = decode(response, "token").await?;
        let lifetime = Duration::from_secs(grant.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(
            target = "mixboard::infra::spotify",
            expires_in = grant.expires_in,
            "obtained provider access token"
        );

        Ok(AccessToken {
            value: grant.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        not_found_id: &str,
    ) -> Result<T, ProviderError> {
        let request = self.authorize(self.client.get(url)).await?;
        let result = match request.send().await {
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                // Force a fresh grant on the next call.
                self.token.write().await.take();
                Err(ProviderError::Protocol(
                    "provider rejected the access token".to_string(),
                ))
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                Err(ProviderError::NotFound {
                    external_id: not_found_id.to_string(),
                })
            }
            Ok(response) => decode(response, operation).await,
            Err(err) => Err(transport_error(err)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ProviderError::NotFound { .. }) => "not_found",
            Err(ProviderError::RateLimited { .. }) => "rate_limited",
            Err(ProviderError::Unreachable(_)) => "unreachable",
            Err(ProviderError::Protocol(_)) => "protocol",
        };
        counter!(PROVIDER_REQUEST_TOTAL, "op" => operation, "outcome" => outcome).increment(1);
        match &result {
            Ok(_) | Err(ProviderError::NotFound { .. }) => {}
            Err(err) => warn!(
                target = "mixboard::infra::spotify",
                op = operation,
                error = %err,
                "provider request failed"
            ),
        }

        result
    }
}

#[async_trait]
impl MusicProvider for SpotifyClient {
    async fn fetch_playlist(
        &self,
        external_id: &str,
    ) -> Result<ExternalPlaylistSnapshot, ProviderError> {
        let url = Self::endpoint(&self.api_base, &["playlists", external_id])?;
        let playlist: PlaylistPayload = self.get_json("playlist", url, external_id).await?;
        Ok(playlist.into_snapshot())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistSummary>, ProviderError> {
        let mut url = Self::endpoint(&self.api_base, &["search"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "playlist")
            .append_pair("limit", &limit.to_string());

        let payload: SearchPayload = self.get_json("search", url, query).await?;
        Ok(payload
            .playlists
            .map(|page| {
                page.items
                    .into_iter()
                    .flatten()
                    .map(PlaylistItem::into_summary)
                    .collect()
            })
            .unwrap_or_default())
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &str,
) -> Result<T, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    let bytes = response.bytes().await.map_err(transport_error)?;
    if status.is_server_error() {
        return Err(ProviderError::Unreachable(format!(
            "{operation} returned status {status}"
        )));
    }
    if !status.is_success() {
        let text = String::from_utf8_lossy(&bytes);
        return Err(ProviderError::Protocol(format!(
            "{operation} returned status {status} body {text}"
        )));
    }

    serde_json::from_slice(&bytes)
        .map_err(|err| ProviderError::Protocol(format!("failed to parse {operation} body: {err}")))
}

fn valid_token(token: Option<&AccessToken>) -> Option<String> {
    token
        .filter(|token| token.expires_at > Instant::now())
        .map(|token| token.value.clone())
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Protocol(err.to_string())
    } else {
        ProviderError::Unreachable(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistPayload {
    id: String,
    name: String,
    #[serde(default)]
    images: Option<Vec<Image>>,
    #[serde(default)]
    external_urls: ExternalUrls,
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Option<TrackItem>>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    track: Option<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistPayload>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ArtistPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    playlists: Option<PlaylistPage>,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<Option<PlaylistItem>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    id: String,
    name: String,
    #[serde(default)]
    images: Option<Vec<Image>>,
}

fn first_image(images: Option<Vec<Image>>) -> Option<String> {
    images?.into_iter().next().map(|image| image.url)
}

impl PlaylistPayload {
    fn into_snapshot(self) -> ExternalPlaylistSnapshot {
        // Positions count every listed item, including removed tracks.
        let tracks = self
            .tracks
            .map(|page| page.items)
            .unwrap_or_default()
            .into_iter()
            .zip(1u32..)
            .filter_map(|(item, position)| {
                let track = item?.track?;
                Some(TrackSnapshot {
                    position,
                    title: track.name,
                    artists: track.artists.into_iter().map(|artist| artist.name).collect(),
                    duration_ms: track.duration_ms,
                })
            })
            .collect();

        ExternalPlaylistSnapshot {
            external_id: self.id,
            name: self.name,
            image_url: first_image(self.images),
            external_url: self.external_urls.spotify,
            tracks,
        }
    }
}

impl PlaylistItem {
    fn into_summary(self) -> PlaylistSummary {
        PlaylistSummary {
            external_id: self.id,
            name: self.name,
            thumbnail_url: first_image(self.images),
        }
    }
}
