//! Repository traits describing persistence adapters.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::catalog::NewCatalogEntry;
use crate::domain::entities::CatalogEntry;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("slug `{slug}` already exists")]
    DuplicateSlug { slug: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("integrity error: {message}")]
    Integrity { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Durable catalog storage.
///
/// Slug uniqueness and the upvote increment are enforced atomically by the
/// implementation, not by callers.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError>;

    /// Highest-voted entries first, ties broken by creation order.
    /// A `limit` of zero returns every entry.
    async fn list_top(&self, limit: usize) -> Result<Vec<CatalogEntry>, RepoError>;

    async fn list_all_ids(&self) -> Result<HashSet<Uuid>, RepoError>;

    async fn increment_upvote(&self, id: Uuid) -> Result<CatalogEntry, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}
