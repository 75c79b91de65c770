//! Conversions between domain values and the wire types of `mixboard-api-types`.

use mixboard_api_types::{
    CreatePlaylistRequest, ExternalPlaylistResponse, PlaylistDetailResponse,
    PlaylistListResponse, PlaylistResponse, SearchItemResponse, SearchResponse, TrackResponse,
};
use serde::Deserialize;

use crate::domain::{
    catalog::EntryDraft,
    entities::{CatalogEntry, ExternalPlaylistSnapshot, PlaylistDetail, PlaylistSummary},
};

pub const DEFAULT_SEARCH_LIMIT: u32 = 8;
pub const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Zero or absent returns the whole catalog.
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT) as usize
    }
}

pub fn draft_from_request(request: CreatePlaylistRequest) -> EntryDraft {
    EntryDraft {
        name: request.name,
        owner: request.owner,
        external_id: request.external_id,
        color: request.color,
    }
}

pub fn playlist_response(entry: &CatalogEntry) -> PlaylistResponse {
    PlaylistResponse {
        id: entry.id,
        name: entry.name.clone(),
        owner: entry.owner.clone(),
        slug: entry.slug.clone(),
        external_id: entry.external_id.clone(),
        color: entry.color.clone(),
        upvotes: entry.upvotes,
        created_at: entry.created_at,
    }
}

pub fn playlist_list_response(entries: &[CatalogEntry]) -> PlaylistListResponse {
    PlaylistListResponse {
        items: entries.iter().map(playlist_response).collect(),
    }
}

pub fn external_response(snapshot: &ExternalPlaylistSnapshot) -> ExternalPlaylistResponse {
    ExternalPlaylistResponse {
        external_id: snapshot.external_id.clone(),
        name: snapshot.name.clone(),
        image_url: snapshot.image_url.clone(),
        external_url: snapshot.external_url.clone(),
        tracks: snapshot
            .tracks
            .iter()
            .map(|track| TrackResponse {
                position: track.position,
                title: track.title.clone(),
                artists: track.artists.clone(),
                duration_ms: track.duration_ms,
            })
            .collect(),
    }
}

pub fn detail_response(detail: &PlaylistDetail) -> PlaylistDetailResponse {
    PlaylistDetailResponse {
        playlist: playlist_response(&detail.entry),
        external: external_response(&detail.snapshot),
    }
}

pub fn search_response(query: &str, items: Vec<PlaylistSummary>) -> SearchResponse {
    SearchResponse {
        query: query.to_string(),
        items: items
            .into_iter()
            .map(|item| SearchItemResponse {
                external_id: item.external_id,
                name: item.name,
                thumbnail_url: item.thumbnail_url,
            })
            .collect(),
    }
}
