//! Mixboard request cache.
//!
//! A keyed, revalidating cache for data that clients read repeatedly:
//!
//! - **Deduplication**: concurrent non-forced fetches of one key share a
//!   single request.
//! - **Stale on error**: a failed refetch records the error and keeps the
//!   last good value readable.
//! - **Observer lifetime**: entries live exactly as long as someone holds a
//!   [`Subscription`] for them.
//!
//! There is no global instance. Whoever needs caching owns a
//! [`RequestCache`] (see `application::session::CatalogSession`).

mod keys;
pub(crate) mod lock;
mod options;
mod request;
mod state;

pub use keys::{EntryKey, ExternalKey, ListKey};
pub use options::SubscribeOptions;
pub use request::{FetchFuture, Fetcher, RequestCache, Subscription, fetcher};
pub use state::{CacheSnapshot, CacheStatus};
