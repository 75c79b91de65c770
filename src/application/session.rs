//! Per-consumer cache context for catalog and provider reads.
//!
//! A `CatalogSession` owns one [`RequestCache`] per request shape. It is the
//! explicit replacement for an ambient, process-wide cache: whoever needs
//! deduplicated reads constructs (or is handed) a session and reads through
//! it.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::application::catalog::CatalogService;
use crate::application::error::AppError;
use crate::application::provider::MusicProvider;
use crate::application::search::{SearchDebouncer, SearchOutcome};
use crate::cache::{
    EntryKey, ExternalKey, Fetcher, ListKey, RequestCache, SubscribeOptions, Subscription,
    fetcher,
};
use crate::domain::entities::{CatalogEntry, ExternalPlaylistSnapshot, PlaylistDetail};

pub type EntryList = Arc<Vec<CatalogEntry>>;

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub search_quiet: Duration,
    pub search_limit: usize,
}

pub struct CatalogSession {
    catalog: CatalogService,
    provider: Arc<dyn MusicProvider>,
    lists: RequestCache<ListKey, EntryList>,
    entries: RequestCache<EntryKey, CatalogEntry>,
    external: RequestCache<ExternalKey, ExternalPlaylistSnapshot>,
    search: SearchDebouncer,
}

impl CatalogSession {
    pub fn new(
        catalog: CatalogService,
        provider: Arc<dyn MusicProvider>,
        options: SessionOptions,
    ) -> Self {
        let search = SearchDebouncer::new(
            Arc::clone(&provider),
            options.search_quiet,
            options.search_limit,
        );
        Self {
            catalog,
            provider,
            lists: RequestCache::new(),
            entries: RequestCache::new(),
            external: RequestCache::new(),
            search,
        }
    }

    fn list_fetcher(&self) -> Fetcher<ListKey, EntryList> {
        let catalog = self.catalog.clone();
        fetcher(move |key: ListKey| {
            let catalog = catalog.clone();
            async move { catalog.list_top(key.limit).await.map(Arc::new) }
        })
    }

    fn entry_fetcher(&self) -> Fetcher<EntryKey, CatalogEntry> {
        let catalog = self.catalog.clone();
        fetcher(move |key: EntryKey| {
            let catalog = catalog.clone();
            async move { catalog.get(key.id).await }
        })
    }

    fn external_fetcher(&self) -> Fetcher<ExternalKey, ExternalPlaylistSnapshot> {
        let provider = Arc::clone(&self.provider);
        fetcher(move |key: ExternalKey| {
            let provider = Arc::clone(&provider);
            async move {
                provider
                    .fetch_playlist(&key.external_id)
                    .await
                    .map_err(AppError::from)
            }
        })
    }

    pub fn watch_list(
        &self,
        limit: usize,
        options: SubscribeOptions<EntryList>,
    ) -> Subscription<ListKey, EntryList> {
        self.lists
            .subscribe(ListKey::top(limit), self.list_fetcher(), options)
    }

    pub fn watch_entry(
        &self,
        id: Uuid,
        options: SubscribeOptions<CatalogEntry>,
    ) -> Subscription<EntryKey, CatalogEntry> {
        self.entries
            .subscribe(EntryKey { id }, self.entry_fetcher(), options)
    }

    pub fn watch_external(
        &self,
        external_id: &str,
        options: SubscribeOptions<ExternalPlaylistSnapshot>,
    ) -> Subscription<ExternalKey, ExternalPlaylistSnapshot> {
        self.external.subscribe(
            ExternalKey::new(external_id),
            self.external_fetcher(),
            options,
        )
    }

    /// The whole catalog, seeded from a rendered page and refreshed at once.
    pub fn open_catalog(&self, seed: Option<Vec<CatalogEntry>>) -> Subscription<ListKey, EntryList> {
        let subscription = self.watch_list(
            0,
            SubscribeOptions::seeded(seed.map(Arc::new)).with_revalidate_on_mount(false),
        );
        self.lists.mutate(&ListKey::ALL);
        subscription
    }

    /// Entry joined with its live provider snapshot.
    ///
    /// The snapshot has no key until the entry is known; once it is, the
    /// snapshot request is explicitly revalidated.
    pub async fn playlist_detail(
        &self,
        id: Uuid,
        seed: Option<CatalogEntry>,
    ) -> Result<PlaylistDetail, AppError> {
        let mut entry_sub = self.watch_entry(
            id,
            SubscribeOptions::seeded(seed).with_revalidate_on_mount(false),
        );
        let entry = entry_sub.settled().await.into_result().map_err(shared_error)?;

        let mut snapshot_sub = self.watch_external(
            &entry.external_id,
            SubscribeOptions::default().with_revalidate_on_mount(false),
        );
        self.external.revalidate(snapshot_sub.key());
        let snapshot = snapshot_sub
            .settled()
            .await
            .into_result()
            .map_err(shared_error)?;

        Ok(PlaylistDetail { entry, snapshot })
    }

    /// One-shot reads: fresh on every call, shared between concurrent callers.
    pub async fn fetch_list(&self, limit: usize) -> Result<EntryList, AppError> {
        let mut subscription =
            self.watch_list(limit, SubscribeOptions::default().with_revalidate_on_mount(true));
        subscription
            .settled()
            .await
            .into_result()
            .map_err(shared_error)
    }

    pub async fn fetch_entry(&self, id: Uuid) -> Result<CatalogEntry, AppError> {
        let mut subscription =
            self.watch_entry(id, SubscribeOptions::default().with_revalidate_on_mount(true));
        subscription
            .settled()
            .await
            .into_result()
            .map_err(shared_error)
    }

    pub async fn fetch_external(
        &self,
        external_id: &str,
    ) -> Result<ExternalPlaylistSnapshot, AppError> {
        let mut subscription = self.watch_external(
            external_id,
            SubscribeOptions::default().with_revalidate_on_mount(true),
        );
        subscription
            .settled()
            .await
            .into_result()
            .map_err(shared_error)
    }

    /// Refresh every observed list after the catalog gained an entry.
    pub fn catalog_changed(&self) -> usize {
        let keys = self.lists.keys();
        let refreshed = keys.iter().filter(|key| self.lists.mutate(key)).count();
        debug!(refreshed, "Catalog lists mutated");
        refreshed
    }

    /// Refresh an entry and every observed list after its votes changed.
    pub fn entry_changed(&self, id: Uuid) -> usize {
        let entry = usize::from(self.entries.mutate(&EntryKey { id }));
        entry + self.catalog_changed()
    }

    pub async fn search(&self, query: &str) -> SearchOutcome {
        self.search.search(query).await
    }

    /// The consumer regained visibility.
    pub fn focus(&self) -> usize {
        self.lists.focus() + self.entries.focus() + self.external.focus()
    }

    pub fn is_idle(&self) -> bool {
        self.lists.is_empty() && self.entries.is_empty() && self.external.is_empty()
    }
}

fn shared_error(err: Arc<AppError>) -> AppError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
        AppError::ValidationFailed(message) => AppError::ValidationFailed(message.clone()),
        AppError::DuplicateSlug { slug } => AppError::DuplicateSlug { slug: slug.clone() },
        AppError::NotFound { entity } => AppError::NotFound { entity },
        AppError::RateLimited { retry_after } => AppError::RateLimited {
            retry_after: *retry_after,
        },
        AppError::Unreachable(message) => AppError::Unreachable(message.clone()),
        AppError::StoreUnavailable(message) => AppError::StoreUnavailable(message.clone()),
        AppError::Unexpected(message) => AppError::Unexpected(message.clone()),
        AppError::Infra(err) => AppError::Unexpected(err.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::provider::ProviderError;
    use crate::domain::catalog::EntryDraft;
    use crate::domain::entities::{PlaylistSummary, TrackSnapshot};
    use crate::infra::memory::InMemoryCatalog;

    #[derive(Default)]
    struct SlowProvider {
        fetches: AtomicUsize,
        offline: bool,
    }

    #[async_trait]
    impl MusicProvider for SlowProvider {
        async fn fetch_playlist(
            &self,
            external_id: &str,
        ) -> Result<ExternalPlaylistSnapshot, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.offline {
                return Err(ProviderError::Unreachable("connection refused".into()));
            }
            Ok(ExternalPlaylistSnapshot {
                external_id: external_id.to_string(),
                name: format!("Live {external_id}"),
                image_url: Some("https://img.example/1.jpg".into()),
                external_url: Some(format!("https://open.example/{external_id}")),
                tracks: vec![TrackSnapshot {
                    position: 1,
                    title: "Opener".into(),
                    artists: vec!["Band".into()],
                    duration_ms: 200_000,
                }],
            })
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<PlaylistSummary>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        catalog: CatalogService,
        provider: Arc<SlowProvider>,
        session: Arc<CatalogSession>,
    }

    fn fixture(offline: bool) -> Fixture {
        let catalog = CatalogService::new(Arc::new(InMemoryCatalog::new()));
        let provider = Arc::new(SlowProvider {
            fetches: AtomicUsize::new(0),
            offline,
        });
        let dyn_provider: Arc<dyn MusicProvider> = provider.clone();
        let session = Arc::new(CatalogSession::new(
            catalog.clone(),
            dyn_provider,
            SessionOptions {
                search_quiet: Duration::from_millis(300),
                search_limit: 8,
            },
        ));
        Fixture {
            catalog,
            provider,
            session,
        }
    }

    async fn seed_entry(catalog: &CatalogService, name: &str) -> CatalogEntry {
        catalog
            .create(EntryDraft {
                name: name.to_string(),
                owner: "Ada".to_string(),
                external_id: format!("ext-{name}"),
                color: None,
            })
            .await
            .expect("created")
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_external_reads_share_one_provider_call() {
        let fx = fixture(false);

        let a = {
            let session = Arc::clone(&fx.session);
            tokio::spawn(async move { session.fetch_external("abc").await })
        };
        let b = {
            let session = Arc::clone(&fx.session);
            tokio::spawn(async move { session.fetch_external("abc").await })
        };

        let a = a.await.expect("task").expect("snapshot");
        let b = b.await.expect("task").expect("snapshot");
        assert_eq!(a, b);
        assert_eq!(fx.provider.fetches.load(Ordering::SeqCst), 1);
        assert!(fx.session.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn detail_joins_seeded_entry_with_live_snapshot() {
        let fx = fixture(false);
        let stored = seed_entry(&fx.catalog, "Friday").await;
        let mut seed = stored.clone();
        seed.upvotes = 41;

        let detail = fx
            .session
            .playlist_detail(stored.id, Some(seed))
            .await
            .expect("detail");

        assert_eq!(detail.entry.upvotes, 41, "seed used without a refetch");
        assert_eq!(detail.snapshot.external_id, "ext-Friday");
        assert_eq!(detail.snapshot.tracks.len(), 1);
        assert_eq!(fx.provider.fetches.load(Ordering::SeqCst), 1);
        assert!(fx.session.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn detail_reports_unknown_entry_and_offline_provider() {
        let fx = fixture(true);
        assert!(
            fx.session
                .playlist_detail(Uuid::new_v4(), None)
                .await
                .expect_err("unknown id")
                .is_not_found()
        );

        let stored = seed_entry(&fx.catalog, "Offline").await;
        let err = fx
            .session
            .playlist_detail(stored.id, None)
            .await
            .expect_err("provider offline");
        assert!(matches!(err, AppError::Unreachable(_)));
    }

    #[tokio::test]
    async fn open_catalog_replaces_seed_with_store_contents() {
        let fx = fixture(false);
        let first = seed_entry(&fx.catalog, "One").await;
        seed_entry(&fx.catalog, "Two").await;

        let mut list = fx.session.open_catalog(Some(vec![first]));
        let initial = list.read();
        assert_eq!(initial.value.as_ref().map(|v| v.len()), Some(1));

        let settled = list.settled().await;
        assert_eq!(settled.value.map(|v| v.len()), Some(2));
    }

    #[tokio::test]
    async fn catalog_changed_refreshes_observed_lists() {
        let fx = fixture(false);
        let mut list = fx.session.open_catalog(None);
        assert_eq!(list.settled().await.value.map(|v| v.len()), Some(0));

        seed_entry(&fx.catalog, "Fresh").await;
        assert_eq!(fx.session.catalog_changed(), 1);
        assert_eq!(list.settled().await.value.map(|v| v.len()), Some(1));
    }
}
