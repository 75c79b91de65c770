use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use uuid::Uuid;

/// A pre-renderable page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKey {
    List,
    Detail(Uuid),
}

impl PageKey {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail(_) => "detail",
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("/"),
            Self::Detail(id) => write!(f, "/playlist/{id}"),
        }
    }
}

/// Output of one successful build.
#[derive(Debug)]
pub struct RenderedPage {
    pub key: PageKey,
    pub html: String,
    pub generated_at: OffsetDateTime,
    built_at: Instant,
}

impl RenderedPage {
    pub fn new(key: PageKey, html: String) -> Self {
        Self {
            key,
            html,
            generated_at: OffsetDateTime::now_utc(),
            built_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() <= window
    }
}

/// What a request for a page receives.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Fresh(Arc<RenderedPage>),
    /// Older than the staleness window; a rebuild runs in the background.
    Stale(Arc<RenderedPage>),
    /// No rendering yet and another request is building it.
    Placeholder,
    NotFound,
}

impl PageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh(_) => "fresh",
            Self::Stale(_) => "stale",
            Self::Placeholder => "placeholder",
            Self::NotFound => "not-found",
        }
    }

    pub fn page(&self) -> Option<&Arc<RenderedPage>> {
        match self {
            Self::Fresh(page) | Self::Stale(page) => Some(page),
            Self::Placeholder | Self::NotFound => None,
        }
    }
}

/// Lifecycle of a page as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Unbuilt,
    Building,
    Fresh,
    Stale,
    NotFound,
}
