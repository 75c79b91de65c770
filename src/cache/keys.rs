//! Cache key definitions.
//!
//! Each key is derived deterministically from the parameters of the request
//! it stands for, so equal requests always land on the same cache entry.

use std::fmt;

use uuid::Uuid;

/// Top-N slice of the catalog. A limit of zero means the whole catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListKey {
    pub limit: usize,
}

impl ListKey {
    pub const ALL: ListKey = ListKey { limit: 0 };

    pub fn top(limit: usize) -> Self {
        Self { limit }
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub id: Uuid,
}

/// The provider's live view of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalKey {
    pub external_id: String,
}

impl ExternalKey {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog/list?limit={}", self.limit)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog/entry/{}", self.id)
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "external/playlist/{}", self.external_id)
    }
}
