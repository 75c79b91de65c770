//! Catalog use cases on top of a [`CatalogRepo`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{CatalogRepo, RepoError};
use crate::domain::catalog::EntryDraft;
use crate::domain::entities::CatalogEntry;

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepo>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepo>) -> Self {
        Self { repo }
    }

    /// Validate, derive the slug and persist a new entry.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: EntryDraft) -> Result<CatalogEntry, AppError> {
        let entry = draft.validate()?;
        let slug = entry.slug.clone();

        let created = self.repo.create(entry).await.map_err(|err| match err {
            RepoError::DuplicateSlug { .. } => AppError::DuplicateSlug { slug },
            other => AppError::from(other),
        })?;

        info!(
            id = %created.id,
            slug = %created.slug,
            external_id = %created.external_id,
            "Catalog entry created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<CatalogEntry, AppError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("playlist"))
    }

    /// Top entries by votes; `limit == 0` returns the whole catalog.
    pub async fn list_top(&self, limit: usize) -> Result<Vec<CatalogEntry>, AppError> {
        Ok(self.repo.list_top(limit).await?)
    }

    pub async fn list_all_ids(&self) -> Result<HashSet<Uuid>, AppError> {
        Ok(self.repo.list_all_ids().await?)
    }

    pub async fn upvote(&self, id: Uuid) -> Result<CatalogEntry, AppError> {
        let entry = self.repo.increment_upvote(id).await?;
        info!(id = %entry.id, upvotes = entry.upvotes, "Catalog entry upvoted");
        Ok(entry)
    }

    pub async fn health(&self) -> Result<(), AppError> {
        Ok(self.repo.health_check().await?)
    }
}
