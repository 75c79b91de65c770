//! HTML builds for the regenerated catalog pages.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::catalog::CatalogService;
use crate::application::error::AppError;
use crate::application::provider::{MusicProvider, ProviderError};
use crate::presentation::views::{
    IndexTemplate, PlaylistDetailView, PlaylistTemplate, format_timestamp, render_template,
};
use crate::regen::{PageBuilder, PageKey};

pub struct CatalogPages {
    catalog: CatalogService,
    provider: Arc<dyn MusicProvider>,
    list_limit: usize,
}

impl CatalogPages {
    pub fn new(catalog: CatalogService, provider: Arc<dyn MusicProvider>, list_limit: usize) -> Self {
        Self {
            catalog,
            provider,
            list_limit,
        }
    }

    async fn build_list(&self) -> Result<String, AppError> {
        let entries = self.catalog.list_top(self.list_limit).await?;
        render_template(IndexTemplate::new(&entries, OffsetDateTime::now_utc()))
    }

    async fn build_detail(&self, id: Uuid) -> Result<String, AppError> {
        let entry = self.catalog.get(id).await?;

        // A playlist removed at the provider still has a catalog page.
        let snapshot = match self.provider.fetch_playlist(&entry.external_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(ProviderError::NotFound { external_id }) => {
                debug!(id = %id, external_id, "Provider no longer knows this playlist");
                None
            }
            Err(err) => return Err(err.into()),
        };

        render_template(PlaylistTemplate {
            view: PlaylistDetailView::new(&entry, snapshot.as_ref()),
            generated_at: format_timestamp(OffsetDateTime::now_utc()),
        })
    }
}

#[async_trait]
impl PageBuilder for CatalogPages {
    async fn known_ids(&self) -> Result<HashSet<Uuid>, AppError> {
        self.catalog.list_all_ids().await
    }

    async fn build(&self, key: PageKey) -> Result<String, AppError> {
        match key {
            PageKey::List => self.build_list().await,
            PageKey::Detail(id) => self.build_detail(id).await,
        }
    }
}
