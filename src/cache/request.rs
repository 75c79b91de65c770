//! Revalidating request cache.
//!
//! One entry per key, shared by every observer of that key. Entries hold the
//! last successful value even while a refetch is running or after one failed,
//! collapse concurrent non-forced fetches into one, and disappear as soon as
//! their last observer goes away.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::future::BoxFuture;
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::application::error::AppError;
use crate::infra::telemetry::{REQUEST_CACHE_DEDUP_TOTAL, REQUEST_CACHE_FETCH_TOTAL};

use super::options::SubscribeOptions;
use super::state::{CacheSnapshot, CacheStatus};

pub type FetchFuture<V> = BoxFuture<'static, Result<V, AppError>>;
pub type Fetcher<K, V> = Arc<dyn Fn(K) -> FetchFuture<V> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<K, V, F, Fut>(f: F) -> Fetcher<K, V>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, AppError>> + Send + 'static,
{
    Arc::new(move |key| Box::pin(f(key)))
}

type Generation = u64;
type ObserverId = u64;

#[derive(Debug, Clone, Copy)]
struct ObserverFlags {
    revalidate_on_focus: bool,
}

struct Slot<K, V> {
    generation: Generation,
    fetcher: Fetcher<K, V>,
    value: Option<V>,
    status: CacheStatus,
    error: Option<Arc<AppError>>,
    observers: HashMap<ObserverId, ObserverFlags>,
    inflight: usize,
    notifier: watch::Sender<CacheSnapshot<V>>,
}

struct PendingFetch<K, V> {
    generation: Generation,
    fetcher: Fetcher<K, V>,
}

impl<K, V: Clone> Slot<K, V> {
    fn new(generation: Generation, fetcher: Fetcher<K, V>, seed: Option<V>) -> Self {
        let status = if seed.is_some() {
            CacheStatus::Ready
        } else {
            CacheStatus::Empty
        };
        let (notifier, _) = watch::channel(CacheSnapshot {
            value: seed.clone(),
            status,
            error: None,
        });
        Self {
            generation,
            fetcher,
            value: seed,
            status,
            error: None,
            observers: HashMap::new(),
            inflight: 0,
            notifier,
        }
    }

    fn snapshot(&self) -> CacheSnapshot<V> {
        CacheSnapshot {
            value: self.value.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        self.notifier.send_replace(self.snapshot());
    }

    fn pending_status(&self) -> CacheStatus {
        if self.value.is_some() {
            CacheStatus::RevalidatingInBackground
        } else {
            CacheStatus::Loading
        }
    }

    /// Returns the fetch to spawn, or `None` when a non-forced trigger was
    /// attached to one already in flight.
    fn trigger(&mut self, label: &dyn Debug, forced: bool) -> Option<PendingFetch<K, V>> {
        if !forced && self.inflight > 0 {
            counter!(REQUEST_CACHE_DEDUP_TOTAL).increment(1);
            debug!(key = ?label, inflight = self.inflight, "Attached to in-flight fetch");
            return None;
        }

        self.inflight += 1;
        self.status = self.pending_status();
        self.publish();
        debug!(key = ?label, forced, inflight = self.inflight, "Request cache fetch started");

        Some(PendingFetch {
            generation: self.generation,
            fetcher: Arc::clone(&self.fetcher),
        })
    }
}

struct Shared<K, V> {
    slots: DashMap<K, Slot<K, V>>,
    next_observer: AtomicU64,
    next_generation: AtomicU64,
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn spawn_fetch(self: &Arc<Self>, key: K, pending: PendingFetch<K, V>) {
        let guard = FetchGuard {
            shared: Arc::clone(self),
            key,
            generation: pending.generation,
            settled: false,
        };
        tokio::spawn(async move {
            let result = (pending.fetcher)(guard.key.clone()).await;
            guard.settle(result);
        });
    }

    fn complete(&self, key: &K, generation: Generation, result: Result<V, AppError>) {
        let Some(mut slot) = self.slots.get_mut(key) else {
            debug!(key = ?key, "Discarded fetch result for evicted entry");
            return;
        };
        if slot.generation != generation {
            debug!(
                key = ?key,
                generation,
                current = slot.generation,
                "Discarded fetch result from a replaced entry"
            );
            return;
        }

        slot.inflight = slot.inflight.saturating_sub(1);
        let settled = slot.inflight == 0;

        match result {
            Ok(value) => {
                counter!(REQUEST_CACHE_FETCH_TOTAL, "outcome" => "ok").increment(1);
                slot.value = Some(value);
                slot.error = None;
                slot.status = if settled {
                    CacheStatus::Ready
                } else {
                    slot.pending_status()
                };
            }
            Err(err) => {
                counter!(REQUEST_CACHE_FETCH_TOTAL, "outcome" => "error").increment(1);
                warn!(
                    key = ?key,
                    error = %err,
                    kept_value = slot.value.is_some(),
                    "Request cache fetch failed"
                );
                slot.error = Some(Arc::new(err));
                slot.status = if settled {
                    CacheStatus::Failed
                } else {
                    slot.pending_status()
                };
            }
        }

        slot.publish();
    }

    fn trigger(self: &Arc<Self>, key: &K, forced: bool) -> bool {
        let pending = {
            let Some(mut slot) = self.slots.get_mut(key) else {
                return false;
            };
            slot.trigger(key, forced)
        };

        match pending {
            Some(pending) => {
                self.spawn_fetch(key.clone(), pending);
                true
            }
            None => false,
        }
    }
}

/// Owns one in-flight fetch; a task that ends without settling it (panic or
/// cancellation) settles it as a failure on drop.
struct FetchGuard<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<K, V>>,
    key: K,
    generation: Generation,
    settled: bool,
}

impl<K, V> FetchGuard<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn settle(mut self, result: Result<V, AppError>) {
        self.settled = true;
        self.shared.complete(&self.key, self.generation, result);
    }
}

impl<K, V> Drop for FetchGuard<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(key = ?self.key, generation = self.generation, "Fetch task ended without a result");
        self.shared.complete(
            &self.key,
            self.generation,
            Err(AppError::unexpected("fetch task ended without a result")),
        );
    }
}

/// Keyed cache of asynchronously fetched values with per-key observers.
///
/// Fetches are spawned on the current tokio runtime, so every method that may
/// start one must be called from within a runtime.
pub struct RequestCache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for RequestCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Default for RequestCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RequestCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: DashMap::new(),
                next_observer: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Register an observer for `key`, creating the entry on first use.
    ///
    /// The most recent `fetcher` passed for a key is the one later fetches
    /// use. A fetch is triggered when the entry has never been filled or
    /// when the options ask for revalidation on mount; either way it is
    /// collapsed into one already in flight.
    pub fn subscribe(
        &self,
        key: K,
        fetcher: Fetcher<K, V>,
        options: SubscribeOptions<V>,
    ) -> Subscription<K, V> {
        let observer = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);

        let (receiver, pending) = {
            let mut slot = self.shared.slots.entry(key.clone()).or_insert_with(|| {
                let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = ?key,
                    generation,
                    seeded = options.seed.is_some(),
                    "Request cache entry created"
                );
                Slot::new(generation, Arc::clone(&fetcher), options.seed.clone())
            });

            slot.fetcher = fetcher;
            slot.observers.insert(
                observer,
                ObserverFlags {
                    revalidate_on_focus: options.revalidate_on_focus,
                },
            );

            let wants_fetch = slot.status == CacheStatus::Empty || options.revalidate_on_mount;
            let pending = if wants_fetch {
                slot.trigger(&key, false)
            } else {
                None
            };
            (slot.notifier.subscribe(), pending)
        };

        if let Some(pending) = pending {
            self.shared.spawn_fetch(key.clone(), pending);
        }

        Subscription {
            shared: Arc::clone(&self.shared),
            key,
            observer,
            receiver,
        }
    }

    /// Non-blocking read of the current state behind a subscription.
    pub fn read(&self, subscription: &Subscription<K, V>) -> CacheSnapshot<V> {
        subscription.read()
    }

    /// Start a refetch of `key` regardless of any fetch already in flight.
    ///
    /// Returns `false` when nobody observes `key`.
    pub fn mutate(&self, key: &K) -> bool {
        self.shared.trigger(key, true)
    }

    /// Signal that `key` may be stale. Collapses into an in-flight fetch.
    ///
    /// Returns whether a new fetch was started.
    pub fn revalidate(&self, key: &K) -> bool {
        self.shared.trigger(key, false)
    }

    /// Revalidate every key with at least one focus-sensitive observer.
    ///
    /// Returns how many fetches were started.
    pub fn focus(&self) -> usize {
        let keys: Vec<K> = self
            .shared
            .slots
            .iter()
            .filter(|slot| {
                slot.observers
                    .values()
                    .any(|flags| flags.revalidate_on_focus)
            })
            .map(|slot| slot.key().clone())
            .collect();

        keys.iter().filter(|key| self.revalidate(key)).count()
    }

    pub fn unsubscribe(&self, subscription: Subscription<K, V>) {
        drop(subscription);
    }

    /// Keys that currently have at least one observer.
    pub fn keys(&self) -> Vec<K> {
        self.shared
            .slots
            .iter()
            .map(|slot| slot.key().clone())
            .collect()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shared.slots.contains_key(key)
    }

    pub fn observer_count(&self, key: &K) -> usize {
        self.shared
            .slots
            .get(key)
            .map(|slot| slot.observers.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.slots.is_empty()
    }
}

/// Observer handle. Dropping it unsubscribes; the entry is evicted when its
/// last observer leaves.
pub struct Subscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<K, V>>,
    key: K,
    observer: ObserverId,
    receiver: watch::Receiver<CacheSnapshot<V>>,
}

impl<K, V> Subscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn read(&self) -> CacheSnapshot<V> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Option<CacheSnapshot<V>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until no fetch is outstanding and return the resulting state.
    pub async fn settled(&mut self) -> CacheSnapshot<V> {
        loop {
            let snapshot = self.receiver.borrow_and_update().clone();
            if !snapshot.status.is_pending() {
                return snapshot;
            }
            if self.receiver.changed().await.is_err() {
                return self.read();
            }
        }
    }
}

impl<K, V> Drop for Subscription<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(mut slot) = self.shared.slots.get_mut(&self.key) {
            slot.observers.remove(&self.observer);
        }

        let evicted = self
            .shared
            .slots
            .remove_if(&self.key, |_, slot| slot.observers.is_empty());
        if evicted.is_some() {
            debug!(key = ?self.key, "Request cache entry evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    type Gate = oneshot::Sender<Result<u32, AppError>>;

    struct Script {
        calls: AtomicUsize,
        gates: Mutex<VecDeque<oneshot::Receiver<Result<u32, AppError>>>>,
    }

    fn script(fetches: usize) -> (Arc<Script>, Vec<Gate>) {
        let mut senders = Vec::new();
        let mut receivers = VecDeque::new();
        for _ in 0..fetches {
            let (tx, rx) = oneshot::channel();
            senders.push(tx);
            receivers.push_back(rx);
        }
        let script = Arc::new(Script {
            calls: AtomicUsize::new(0),
            gates: Mutex::new(receivers),
        });
        (script, senders)
    }

    fn scripted(script: &Arc<Script>) -> Fetcher<&'static str, u32> {
        let script = Arc::clone(script);
        fetcher(move |_key: &'static str| {
            script.calls.fetch_add(1, Ordering::SeqCst);
            let gate = script.gates.lock().expect("gates").pop_front();
            async move {
                match gate {
                    Some(rx) => rx
                        .await
                        .unwrap_or_else(|_| Err(AppError::unexpected("gate dropped"))),
                    None => Err(AppError::unexpected("unscripted fetch")),
                }
            }
        })
    }

    async fn wait_for(
        subscription: &mut Subscription<&'static str, u32>,
        predicate: impl Fn(&CacheSnapshot<u32>) -> bool,
    ) -> CacheSnapshot<u32> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = subscription.read();
                if predicate(&snapshot) {
                    return snapshot;
                }
                subscription.changed().await.expect("entry alive");
            }
        })
        .await
        .expect("condition reached in time")
    }

    #[tokio::test]
    async fn concurrent_subscribers_share_one_fetch() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(1);

        let mut first = cache.subscribe("list", scripted(&script), SubscribeOptions::default());
        let mut second = cache.subscribe("list", scripted(&script), SubscribeOptions::default());
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.read().status, CacheStatus::Loading);
        assert_eq!(cache.observer_count(&"list"), 2);

        gates.remove(0).send(Ok(5)).expect("fetch waiting");

        let a = first.settled().await;
        let b = second.settled().await;
        assert_eq!(a.value, Some(5));
        assert_eq!(b.value, Some(5));
        assert_eq!(b.status, CacheStatus::Ready);
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn revalidate_collapses_into_inflight_fetch() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(1);
        let mut sub = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());

        assert!(!cache.revalidate(&"entry"));
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);

        gates.remove(0).send(Ok(1)).expect("fetch waiting");
        assert_eq!(sub.settled().await.value, Some(1));
    }

    #[tokio::test]
    async fn mutate_forces_refetch_and_last_completion_wins() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(2);
        let mut sub = cache.subscribe("list", scripted(&script), SubscribeOptions::default());

        assert!(cache.mutate(&"list"));
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);

        let first = gates.remove(0);
        let second = gates.remove(0);

        second.send(Ok(2)).expect("second fetch waiting");
        let interim = wait_for(&mut sub, |snap| snap.value == Some(2)).await;
        assert_eq!(interim.status, CacheStatus::RevalidatingInBackground);

        first.send(Ok(1)).expect("first fetch waiting");
        let done = wait_for(&mut sub, |snap| snap.status == CacheStatus::Ready).await;
        assert_eq!(done.value, Some(1));
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_value() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(2);
        let mut sub = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());

        gates.remove(0).send(Ok(9)).expect("fetch waiting");
        assert_eq!(sub.settled().await.value, Some(9));

        assert!(cache.mutate(&"entry"));
        assert_eq!(sub.read().status, CacheStatus::RevalidatingInBackground);
        gates
            .remove(0)
            .send(Err(AppError::unexpected("provider down")))
            .expect("refetch waiting");

        let failed = sub.settled().await;
        assert_eq!(failed.status, CacheStatus::Failed);
        assert_eq!(failed.value, Some(9));
        assert!(failed.error.is_some());
        assert_eq!(failed.into_result().expect("stale value wins"), 9);
    }

    #[tokio::test]
    async fn success_after_failure_clears_error() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(2);
        let mut sub = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());

        gates
            .remove(0)
            .send(Err(AppError::unexpected("first try")))
            .expect("fetch waiting");
        let failed = sub.settled().await;
        assert_eq!(failed.status, CacheStatus::Failed);
        assert_eq!(failed.value, None);

        assert!(cache.revalidate(&"entry"));
        gates.remove(0).send(Ok(3)).expect("retry waiting");
        let ready = sub.settled().await;
        assert_eq!(ready.status, CacheStatus::Ready);
        assert!(ready.error.is_none());
    }

    #[tokio::test]
    async fn last_unsubscribe_evicts_and_discards_late_results() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(2);

        let sub = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());
        cache.unsubscribe(sub);
        assert!(!cache.contains_key(&"entry"));
        assert!(!cache.mutate(&"entry"));

        let mut again = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());
        assert_eq!(again.read().status, CacheStatus::Loading);
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);

        let stale = gates.remove(0);
        let fresh = gates.remove(0);
        stale.send(Ok(100)).expect("evicted fetch still running");
        fresh.send(Ok(200)).expect("new fetch waiting");

        assert_eq!(again.settled().await.value, Some(200));
        tokio::task::yield_now().await;
        assert_eq!(again.read().value, Some(200));
    }

    #[tokio::test]
    async fn entry_survives_until_last_observer_leaves() {
        let cache = RequestCache::new();
        let (script, _gates) = script(1);

        let first = cache.subscribe("entry", scripted(&script), SubscribeOptions::seeded(Some(1)));
        let second = cache.subscribe("entry", scripted(&script), SubscribeOptions::default());
        drop(first);
        assert!(cache.contains_key(&"entry"));
        assert_eq!(cache.observer_count(&"entry"), 1);
        drop(second);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn seed_is_ready_without_fetching() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(1);

        let sub = cache.subscribe(
            "list",
            scripted(&script),
            SubscribeOptions::seeded(Some(4)),
        );
        let snapshot = cache.read(&sub);
        assert_eq!(snapshot.status, CacheStatus::Ready);
        assert_eq!(snapshot.value, Some(4));
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);

        let mut mounted = cache.subscribe(
            "list",
            scripted(&script),
            SubscribeOptions::seeded(Some(99)).with_revalidate_on_mount(true),
        );
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
        let revalidating = mounted.read();
        assert_eq!(revalidating.status, CacheStatus::RevalidatingInBackground);
        assert_eq!(revalidating.value, Some(4), "seed only applies on creation");

        gates.remove(0).send(Ok(8)).expect("fetch waiting");
        assert_eq!(mounted.settled().await.value, Some(8));
    }

    #[tokio::test]
    async fn focus_only_revalidates_focus_sensitive_keys() {
        let cache = RequestCache::new();
        let (script, mut gates) = script(1);

        let _quiet = cache.subscribe(
            "quiet",
            scripted(&script),
            SubscribeOptions::seeded(Some(1)).with_revalidate_on_focus(false),
        );
        let mut eager = cache.subscribe(
            "eager",
            scripted(&script),
            SubscribeOptions::seeded(Some(2)),
        );

        assert_eq!(cache.focus(), 1);
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);

        gates.remove(0).send(Ok(20)).expect("fetch waiting");
        assert_eq!(eager.settled().await.value, Some(20));
    }

    #[tokio::test]
    async fn panicking_fetch_settles_as_failure_and_frees_the_key() {
        let cache = RequestCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let panicking: Fetcher<&'static str, u32> = {
            let calls = Arc::clone(&calls);
            fetcher(move |_key: &'static str| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        panic!("fetcher blew up");
                    }
                    Ok(7)
                }
            })
        };

        let mut first = cache.subscribe("entry", Arc::clone(&panicking), SubscribeOptions::default());
        let failed = tokio::time::timeout(Duration::from_millis(500), first.settled())
            .await
            .expect("settled after panic");
        assert_eq!(failed.status, CacheStatus::Failed);
        assert!(matches!(failed.error.as_deref(), Some(AppError::Unexpected(_))));

        let mut second = cache.subscribe(
            "entry",
            panicking,
            SubscribeOptions::default().with_revalidate_on_mount(true),
        );
        let recovered = tokio::time::timeout(Duration::from_millis(500), second.settled())
            .await
            .expect("settled after retry");
        assert_eq!(recovered.status, CacheStatus::Ready);
        assert_eq!(recovered.value, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.revalidate(&"entry"));
    }
}
