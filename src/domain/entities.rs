//! Catalog entities and the ephemeral provider snapshots joined against them.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A locally stored playlist reference with voting metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    /// Derived from `name` at creation and never recomputed.
    pub slug: String,
    /// Opaque reference into the external provider.
    pub external_id: String,
    pub color: String,
    pub upvotes: u64,
    pub created_at: OffsetDateTime,
}

/// Point-in-time read of a playlist from the external provider.
///
/// Lives only as long as the cache entry or rendered page holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalPlaylistSnapshot {
    pub external_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub external_url: Option<String>,
    pub tracks: Vec<TrackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSnapshot {
    pub position: u32,
    pub title: String,
    pub artists: Vec<String>,
    pub duration_ms: u64,
}

impl TrackSnapshot {
    /// `m:ss` rendering of the track length.
    pub fn duration_label(&self) -> String {
        let total_seconds = self.duration_ms / 1000;
        format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
    }

    pub fn artists_label(&self) -> String {
        self.artists.join(", ")
    }
}

/// Partial snapshot returned by provider search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistSummary {
    pub external_id: String,
    pub name: String,
    pub thumbnail_url: Option<String>,
}

/// Stored entry merged with its live snapshot, as shown on a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistDetail {
    pub entry: CatalogEntry,
    pub snapshot: ExternalPlaylistSnapshot,
}
