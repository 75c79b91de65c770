//! Port for the external music metadata provider.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ExternalPlaylistSnapshot, PlaylistSummary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("playlist `{external_id}` not found at provider")]
    NotFound { external_id: String },
    #[error("provider rate limit reached")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("provider protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    async fn fetch_playlist(
        &self,
        external_id: &str,
    ) -> Result<ExternalPlaylistSnapshot, ProviderError>;

    /// Implementations may assume `query` is non-blank and `limit` positive;
    /// use [`search_playlists`] from callers.
    async fn search(&self, query: &str, limit: usize)
    -> Result<Vec<PlaylistSummary>, ProviderError>;
}

/// Playlist search with the blank-query short circuit applied. Returns at
/// most `limit` results whatever the provider sends back.
pub async fn search_playlists(
    provider: &dyn MusicProvider,
    query: &str,
    limit: usize,
) -> Result<Vec<PlaylistSummary>, ProviderError> {
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut items = provider.search(query, limit).await?;
    items.truncate(limit);
    Ok(items)
}
