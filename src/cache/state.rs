use std::sync::Arc;

use crate::application::error::AppError;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Created without a seed; nothing fetched yet.
    Empty,
    /// A fetch is outstanding and there is no value to show.
    Loading,
    Ready,
    /// A fetch is outstanding while a previous value stays readable.
    RevalidatingInBackground,
    /// The most recent fetch failed. Any earlier value is still present.
    Failed,
}

impl CacheStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Loading | Self::RevalidatingInBackground)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::RevalidatingInBackground => "revalidating",
            Self::Failed => "failed",
        }
    }
}

/// What an observer sees when it reads an entry.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<V> {
    pub value: Option<V>,
    pub status: CacheStatus,
    pub error: Option<Arc<AppError>>,
}

impl<V> CacheSnapshot<V> {
    /// Prefer data over errors: a stale value wins over the failure that
    /// followed it.
    pub fn into_result(self) -> Result<V, Arc<AppError>> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(Arc::new(AppError::unexpected(format!(
                "cache entry has no value in status `{}`",
                self.status.as_str()
            )))),
        }
    }
}
