//! Debounced playlist search.
//!
//! Rapid successive queries collapse into the last one: every call waits out
//! a quiet window and only proceeds if no newer call arrived meanwhile.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::application::error::AppError;
use crate::application::provider::{MusicProvider, search_playlists};
use crate::domain::entities::PlaylistSummary;

pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(300);
pub const DEFAULT_RESULT_LIMIT: usize = 8;

#[derive(Debug)]
pub enum SearchOutcome {
    /// A newer query arrived; this one never reached the provider or its
    /// results were dropped.
    Superseded,
    Results(Vec<PlaylistSummary>),
    Failed(AppError),
}

pub struct SearchDebouncer {
    provider: Arc<dyn MusicProvider>,
    quiet: Duration,
    limit: usize,
    generation: AtomicU64,
}

impl SearchDebouncer {
    pub fn new(provider: Arc<dyn MusicProvider>, quiet: Duration, limit: usize) -> Self {
        Self {
            provider,
            quiet,
            limit,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn search(&self, query: &str) -> SearchOutcome {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if query.trim().is_empty() {
            return SearchOutcome::Results(Vec::new());
        }

        tokio::time::sleep(self.quiet).await;
        if self.is_superseded(ticket) {
            debug!(query, "Search superseded before dispatch");
            return SearchOutcome::Superseded;
        }

        let result = search_playlists(self.provider.as_ref(), query, self.limit).await;
        if self.is_superseded(ticket) {
            debug!(query, "Search results dropped for newer query");
            return SearchOutcome::Superseded;
        }

        match result {
            Ok(items) => SearchOutcome::Results(items),
            Err(err) => SearchOutcome::Failed(err.into()),
        }
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != ticket
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::application::provider::ProviderError;
    use crate::domain::entities::ExternalPlaylistSnapshot;

    #[derive(Default)]
    struct RecordingProvider {
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl MusicProvider for RecordingProvider {
        async fn fetch_playlist(
            &self,
            external_id: &str,
        ) -> Result<ExternalPlaylistSnapshot, ProviderError> {
            Err(ProviderError::NotFound {
                external_id: external_id.to_string(),
            })
        }

        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<PlaylistSummary>, ProviderError> {
            self.queries
                .lock()
                .expect("queries")
                .push((query.to_string(), limit));
            if query == "fail" {
                return Err(ProviderError::Unreachable("offline".into()));
            }
            Ok(vec![PlaylistSummary {
                external_id: format!("id-{query}"),
                name: query.to_string(),
                thumbnail_url: None,
            }])
        }
    }

    fn debouncer(provider: &Arc<RecordingProvider>) -> Arc<SearchDebouncer> {
        let provider: Arc<dyn MusicProvider> = provider.clone();
        Arc::new(SearchDebouncer::new(
            provider,
            DEFAULT_QUIET_WINDOW,
            DEFAULT_RESULT_LIMIT,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_query_in_a_burst_reaches_the_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let search = debouncer(&provider);

        let mut handles = Vec::new();
        for query in ["l", "lo", "lof", "lofi"] {
            let search = Arc::clone(&search);
            handles.push(tokio::spawn(async move { search.search(query).await }));
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("task"));
        }

        assert!(
            outcomes[..3]
                .iter()
                .all(|outcome| matches!(outcome, SearchOutcome::Superseded))
        );
        match &outcomes[3] {
            SearchOutcome::Results(items) => assert_eq!(items[0].name, "lofi"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            *provider.queries.lock().expect("queries"),
            vec![("lofi".to_string(), DEFAULT_RESULT_LIMIT)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_query_returns_immediately_and_cancels_pending() {
        let provider = Arc::new(RecordingProvider::default());
        let search = debouncer(&provider);

        let pending = {
            let search = Arc::clone(&search);
            tokio::spawn(async move { search.search("jazz").await })
        };
        tokio::task::yield_now().await;

        match search.search("   ").await {
            SearchOutcome::Results(items) => assert!(items.is_empty()),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!(matches!(
            pending.await.expect("task"),
            SearchOutcome::Superseded
        ));
        assert!(provider.queries.lock().expect("queries").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failures_are_reported() {
        let provider = Arc::new(RecordingProvider::default());
        let search = debouncer(&provider);
        match search.search("fail").await {
            SearchOutcome::Failed(err) => assert!(err.is_transient()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
