//! Process-local catalog store used when no database is configured and in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CatalogRepo, RepoError};
use crate::cache::lock::mutex_lock;
use crate::domain::catalog::NewCatalogEntry;
use crate::domain::entities::CatalogEntry;

const LOCK_OWNER: &str = "infra::memory";

#[derive(Default)]
struct Table {
    rows: HashMap<Uuid, StoredRow>,
    slugs: HashMap<String, Uuid>,
    next_seq: u64,
}

struct StoredRow {
    seq: u64,
    entry: CatalogEntry,
}

/// Every operation runs under one mutex, so the slug check and the vote
/// increment are atomic with respect to concurrent callers.
#[derive(Default)]
pub struct InMemoryCatalog {
    table: Mutex<Table>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepo for InMemoryCatalog {
    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry, RepoError> {
        let mut table = mutex_lock(&self.table, LOCK_OWNER, "create");
        if table.slugs.contains_key(&entry.slug) {
            return Err(RepoError::DuplicateSlug { slug: entry.slug });
        }

        let created = CatalogEntry {
            id: Uuid::new_v4(),
            name: entry.name,
            owner: entry.owner,
            slug: entry.slug,
            external_id: entry.external_id,
            color: entry.color,
            upvotes: 0,
            created_at: OffsetDateTime::now_utc(),
        };

        let seq = table.next_seq;
        table.next_seq += 1;
        table.slugs.insert(created.slug.clone(), created.id);
        table.rows.insert(
            created.id,
            StoredRow {
                seq,
                entry: created.clone(),
            },
        );
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError> {
        let table = mutex_lock(&self.table, LOCK_OWNER, "find_by_id");
        Ok(table.rows.get(&id).map(|row| row.entry.clone()))
    }

    async fn list_top(&self, limit: usize) -> Result<Vec<CatalogEntry>, RepoError> {
        let table = mutex_lock(&self.table, LOCK_OWNER, "list_top");
        let mut rows: Vec<&StoredRow> = table.rows.values().collect();
        rows.sort_by(|a, b| {
            b.entry
                .upvotes
                .cmp(&a.entry.upvotes)
                .then(a.seq.cmp(&b.seq))
        });

        let take = if limit == 0 { rows.len() } else { limit };
        Ok(rows
            .into_iter()
            .take(take)
            .map(|row| row.entry.clone())
            .collect())
    }

    async fn list_all_ids(&self) -> Result<HashSet<Uuid>, RepoError> {
        let table = mutex_lock(&self.table, LOCK_OWNER, "list_all_ids");
        Ok(table.rows.keys().copied().collect())
    }

    async fn increment_upvote(&self, id: Uuid) -> Result<CatalogEntry, RepoError> {
        let mut table = mutex_lock(&self.table, LOCK_OWNER, "increment_upvote");
        let row = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        row.entry.upvotes = row
            .entry
            .upvotes
            .checked_add(1)
            .ok_or_else(|| RepoError::Integrity {
                message: format!("upvote counter overflow for {id}"),
            })?;
        Ok(row.entry.clone())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
