//! Incremental regeneration of pre-rendered pages.
//!
//! Every page moves through `Unbuilt -> Building -> Fresh -> Stale` and back
//! to `Fresh` on a successful rebuild. A stale page is served while exactly
//! one background rebuild runs; a page with no rendering is built in the
//! request that first asks for it while concurrent requests get a
//! placeholder. A detail page whose entry does not exist settles in the
//! terminal `NotFound` state; those marks live in a bounded LRU so unknown
//! ids in request paths cannot grow the scheduler without limit.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::{StreamExt, stream};
use lru::LruCache;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::infra::telemetry::{PAGE_REBUILD_MS, PAGE_REBUILD_TOTAL};

use super::page::{PageKey, PageOutcome, PageState, RenderedPage};

const LOCK_OWNER: &str = "regen::scheduler";
const PRERENDER_CONCURRENCY: usize = 4;
const DEFAULT_NOT_FOUND_LIMIT: usize = 1024;

/// Produces page HTML from current catalog data.
#[async_trait]
pub trait PageBuilder: Send + Sync {
    /// Ids of every detail page that should exist.
    async fn known_ids(&self) -> Result<HashSet<Uuid>, AppError>;

    /// Render `key`. `AppError::NotFound` means the page has no subject.
    async fn build(&self, key: PageKey) -> Result<String, AppError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationReport {
    pub known: usize,
    pub built: usize,
    pub missing: usize,
    pub failed: usize,
}

enum Lookup {
    Fresh(Arc<RenderedPage>),
    Stale(Arc<RenderedPage>),
    NotFound,
    Missing,
}

struct SchedulerInner {
    builder: Arc<dyn PageBuilder>,
    window: Duration,
    slots: Mutex<HashMap<PageKey, Arc<RenderedPage>>>,
    not_found: Mutex<LruCache<PageKey, ()>>,
    building: Arc<DashMap<PageKey, ()>>,
    known: RwLock<HashSet<Uuid>>,
}

/// Marks a page as being built; released on drop, including when the build
/// task panics.
struct BuildGuard {
    key: PageKey,
    building: Arc<DashMap<PageKey, ()>>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.building.remove(&self.key);
    }
}

impl SchedulerInner {
    fn lookup(&self, key: PageKey) -> Lookup {
        let slots = mutex_lock(&self.slots, LOCK_OWNER, "lookup");
        match slots.get(&key) {
            Some(page) if page.is_fresh(self.window) => Lookup::Fresh(Arc::clone(page)),
            Some(page) => Lookup::Stale(Arc::clone(page)),
            None if mutex_lock(&self.not_found, LOCK_OWNER, "lookup").contains(&key) => {
                Lookup::NotFound
            }
            None => Lookup::Missing,
        }
    }

    fn try_begin(&self, key: PageKey) -> Option<BuildGuard> {
        match self.building.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(BuildGuard {
                    key,
                    building: Arc::clone(&self.building),
                })
            }
            Entry::Occupied(_) => None,
        }
    }

    fn is_known(&self, id: Uuid) -> bool {
        rw_read(&self.known, LOCK_OWNER, "is_known").contains(&id)
    }

    async fn rebuild(self: Arc<Self>, key: PageKey, guard: BuildGuard) -> Result<PageOutcome, AppError> {
        let started = Instant::now();
        let result = self.builder.build(key).await;
        histogram!(PAGE_REBUILD_MS, "page" => key.kind())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let (outcome, label) = {
            let mut slots = mutex_lock(&self.slots, LOCK_OWNER, "rebuild");
            let current = slots.get(&key).cloned();
            match result {
                Ok(html) => {
                    let page = Arc::new(RenderedPage::new(key, html));
                    slots.insert(key, Arc::clone(&page));
                    mutex_lock(&self.not_found, LOCK_OWNER, "rebuild").pop(&key);
                    debug!(page = %key, "Page rebuilt");
                    (Ok(PageOutcome::Fresh(page)), "ok")
                }
                Err(err) if err.is_not_found() && current.is_none() => {
                    mutex_lock(&self.not_found, LOCK_OWNER, "rebuild").put(key, ());
                    debug!(page = %key, "Page has no subject; marked not found");
                    (Ok(PageOutcome::NotFound), "not_found")
                }
                Err(err) => {
                    warn!(
                        page = %key,
                        error = %err,
                        transient = err.is_transient(),
                        kept_stale = current.is_some(),
                        "Page rebuild failed"
                    );
                    match current {
                        Some(page) => (Ok(PageOutcome::Stale(page)), "error"),
                        None => (Err(err), "error"),
                    }
                }
            }
        };

        counter!(PAGE_REBUILD_TOTAL, "page" => key.kind(), "outcome" => label).increment(1);

        if let (PageKey::Detail(id), Ok(PageOutcome::Fresh(_))) = (key, &outcome) {
            rw_write(&self.known, LOCK_OWNER, "rebuild").insert(id);
        }

        drop(guard);
        outcome
    }
}

/// Decides, per request, between serving, rebuilding and placeholding.
#[derive(Clone)]
pub struct PageScheduler {
    inner: Arc<SchedulerInner>,
}

impl PageScheduler {
    pub fn new(builder: Arc<dyn PageBuilder>, window: Duration) -> Self {
        let limit = NonZeroUsize::new(DEFAULT_NOT_FOUND_LIMIT).unwrap_or(NonZeroUsize::MIN);
        Self::with_not_found_limit(builder, window, limit)
    }

    /// Like [`PageScheduler::new`], remembering at most `limit` not-found
    /// detail pages; the least recently marked is forgotten first.
    pub fn with_not_found_limit(
        builder: Arc<dyn PageBuilder>,
        window: Duration,
        limit: NonZeroUsize,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                builder,
                window,
                slots: Mutex::new(HashMap::new()),
                not_found: Mutex::new(LruCache::new(limit)),
                building: Arc::new(DashMap::new()),
                known: RwLock::new(HashSet::new()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    pub async fn render_list(&self) -> Result<PageOutcome, AppError> {
        self.render(PageKey::List).await
    }

    pub async fn render_detail(&self, id: Uuid) -> Result<PageOutcome, AppError> {
        self.render(PageKey::Detail(id)).await
    }

    /// Serve `key`, starting a rebuild when the page is stale or missing.
    ///
    /// Returns an error only when the page has no rendering and the build
    /// this call performed failed for a reason other than `NotFound`.
    pub async fn render(&self, key: PageKey) -> Result<PageOutcome, AppError> {
        match self.inner.lookup(key) {
            Lookup::Fresh(page) => Ok(PageOutcome::Fresh(page)),
            Lookup::NotFound => Ok(PageOutcome::NotFound),
            Lookup::Stale(page) => {
                if let Some(guard) = self.inner.try_begin(key) {
                    // A rebuild may have landed between lookup and acquire.
                    if let Lookup::Fresh(page) = self.inner.lookup(key) {
                        return Ok(PageOutcome::Fresh(page));
                    }
                    debug!(page = %key, age_secs = page.age().as_secs(), "Serving stale page; rebuilding");
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let _ = inner.rebuild(key, guard).await;
                    });
                }
                Ok(PageOutcome::Stale(page))
            }
            Lookup::Missing => {
                let Some(guard) = self.inner.try_begin(key) else {
                    return Ok(PageOutcome::Placeholder);
                };
                match self.inner.lookup(key) {
                    Lookup::Missing => {}
                    Lookup::Fresh(page) => return Ok(PageOutcome::Fresh(page)),
                    Lookup::Stale(page) => return Ok(PageOutcome::Stale(page)),
                    Lookup::NotFound => return Ok(PageOutcome::NotFound),
                }

                if let PageKey::Detail(id) = key
                    && !self.inner.is_known(id)
                {
                    debug!(page = %key, "Building page for an id outside the last enumeration");
                }

                // Run detached so a dropped request cannot abandon the build.
                let inner = Arc::clone(&self.inner);
                tokio::spawn(inner.rebuild(key, guard))
                    .await
                    .map_err(|err| AppError::unexpected(format!("page build task failed: {err}")))?
            }
        }
    }

    /// Read `listAllIds` and build the list page plus every known detail page.
    ///
    /// Individual build failures are logged and leave those pages unbuilt.
    pub async fn enumerate(&self) -> Result<EnumerationReport, AppError> {
        let ids = self.inner.builder.known_ids().await?;
        *rw_write(&self.inner.known, LOCK_OWNER, "enumerate") = ids.clone();

        let keys: Vec<PageKey> = std::iter::once(PageKey::List)
            .chain(ids.iter().copied().map(PageKey::Detail))
            .collect();

        let outcomes: Vec<Result<Option<PageOutcome>, AppError>> = stream::iter(keys)
            .map(|key| self.prerender(key))
            .buffer_unordered(PRERENDER_CONCURRENCY)
            .collect()
            .await;

        let mut report = EnumerationReport {
            known: ids.len(),
            ..EnumerationReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(Some(PageOutcome::Fresh(_))) => report.built += 1,
                Ok(Some(PageOutcome::NotFound)) => report.missing += 1,
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => report.failed += 1,
            }
        }

        info!(
            known = report.known,
            built = report.built,
            missing = report.missing,
            failed = report.failed,
            "Page enumeration finished"
        );
        Ok(report)
    }

    async fn prerender(&self, key: PageKey) -> Result<Option<PageOutcome>, AppError> {
        let Some(guard) = self.inner.try_begin(key) else {
            return Ok(None);
        };
        Arc::clone(&self.inner).rebuild(key, guard).await.map(Some)
    }

    /// Record a newly created entry and clear any remembered `NotFound` for
    /// its detail page.
    pub fn register_known(&self, id: Uuid) {
        rw_write(&self.inner.known, LOCK_OWNER, "register_known").insert(id);
        let cleared = mutex_lock(&self.inner.not_found, LOCK_OWNER, "register_known")
            .pop(&PageKey::Detail(id))
            .is_some();
        if cleared {
            debug!(id = %id, "Cleared not-found page for new entry");
        }
    }

    /// Number of detail pages currently remembered as not found.
    pub fn not_found_len(&self) -> usize {
        mutex_lock(&self.inner.not_found, LOCK_OWNER, "not_found_len").len()
    }

    /// Number of pages holding a rendering.
    pub fn rendered_len(&self) -> usize {
        mutex_lock(&self.inner.slots, LOCK_OWNER, "rendered_len").len()
    }

    pub fn is_known(&self, id: Uuid) -> bool {
        self.inner.is_known(id)
    }

    pub fn known_ids(&self) -> HashSet<Uuid> {
        rw_read(&self.inner.known, LOCK_OWNER, "known_ids").clone()
    }

    pub fn is_building(&self, key: PageKey) -> bool {
        self.inner.building.contains_key(&key)
    }

    pub fn state(&self, key: PageKey) -> PageState {
        match self.inner.lookup(key) {
            Lookup::Fresh(_) => PageState::Fresh,
            Lookup::Stale(_) => PageState::Stale,
            Lookup::NotFound => PageState::NotFound,
            Lookup::Missing if self.is_building(key) => PageState::Building,
            Lookup::Missing => PageState::Unbuilt,
        }
    }
}
