use std::collections::HashSet;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CatalogRepo, RepoError},
    domain::{catalog::NewCatalogEntry, entities::CatalogEntry},
};

use super::{PostgresRepositories, map_sqlx_error};

const ENTRY_COLUMNS: &str = "id, name, owner, slug, external_id, color, upvotes, created_at";

#[derive(sqlx::FromRow)]
struct PlaylistRow {
    id: Uuid,
    name: String,
    owner: String,
    slug: String,
    external_id: String,
    color: String,
    upvotes: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<PlaylistRow> for CatalogEntry {
    type Error = RepoError;

    fn try_from(row: PlaylistRow) -> Result<Self, Self::Error> {
        let upvotes = u64::try_from(row.upvotes).map_err(|_| RepoError::Integrity {
            message: format!("negative upvote count {} for {}", row.upvotes, row.id),
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            slug: row.slug,
            external_id: row.external_id,
            color: row.color,
            upvotes,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CatalogRepo for PostgresRepositories {
    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry, RepoError> {
        let sql = format!(
            "INSERT INTO playlists (id, name, owner, slug, external_id, color) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ENTRY_COLUMNS}"
        );

        let row = sqlx::query_as::<_, PlaylistRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&entry.name)
            .bind(&entry.owner)
            .bind(&entry.slug)
            .bind(&entry.external_id)
            .bind(&entry.color)
            .fetch_one(self.pool())
            .await
            .map_err(|err| map_sqlx_error(err, Some(&entry.slug)))?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM playlists WHERE id = $1");

        let row = sqlx::query_as::<_, PlaylistRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|err| map_sqlx_error(err, None))?;

        row.map(CatalogEntry::try_from).transpose()
    }

    async fn list_top(&self, limit: usize) -> Result<Vec<CatalogEntry>, RepoError> {
        // LIMIT NULL is no limit in Postgres.
        let limit = match limit {
            0 => None,
            n => Some(i64::try_from(n).map_err(|_| RepoError::InvalidInput {
                message: format!("list limit {n} out of range"),
            })?),
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM playlists \
             ORDER BY upvotes DESC, seq ASC \
             LIMIT $1"
        );

        let rows = sqlx::query_as::<_, PlaylistRow>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(|err| map_sqlx_error(err, None))?;

        rows.into_iter().map(CatalogEntry::try_from).collect()
    }

    async fn list_all_ids(&self) -> Result<HashSet<Uuid>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM playlists")
            .fetch_all(self.pool())
            .await
            .map_err(|err| map_sqlx_error(err, None))?;

        Ok(ids.into_iter().collect())
    }

    async fn increment_upvote(&self, id: Uuid) -> Result<CatalogEntry, RepoError> {
        let sql = format!(
            "UPDATE playlists SET upvotes = upvotes + 1 WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
        );

        let row = sqlx::query_as::<_, PlaylistRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|err| map_sqlx_error(err, None))?
            .ok_or(RepoError::NotFound)?;

        row.try_into()
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping()
            .await
            .map_err(|err| map_sqlx_error(err, None))
    }
}
