//! Request and response bodies of the Mixboard JSON API.
//!
//! These types are shared between the server and any client that talks to
//! it, so they carry no behaviour beyond serde.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Body of `POST /api/playlists`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub owner: String,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistResponse {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub slug: String,
    pub external_id: String,
    pub color: String,
    pub upvotes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistListResponse {
    pub items: Vec<PlaylistResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackResponse {
    pub position: u32,
    pub title: String,
    pub artists: Vec<String>,
    pub duration_ms: u64,
}

/// Live data for a playlist as reported by the external provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalPlaylistResponse {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub tracks: Vec<TrackResponse>,
}

/// A catalog entry joined with the provider's live view of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistDetailResponse {
    pub playlist: PlaylistResponse,
    pub external: ExternalPlaylistResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchItemResponse {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResponse {
    pub query: String,
    pub items: Vec<SearchItemResponse>,
}
