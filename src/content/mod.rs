//! Content source abstraction
//!
//! The host content system owns the content items; this crate only asks it
//! three things: which types are indexable, which ids exist, and what the
//! current locator of an id is.

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a content item. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ContentId(i64);

impl ContentId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw <= 0 {
            return Err(Error::MalformedIdentifier(raw.to_string()));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| Error::MalformedIdentifier(s.to_string()))?;
        Self::new(raw)
    }
}

impl TryFrom<i64> for ContentId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<ContentId> for i64 {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

/// A published content item as the host currently sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub content_type: String,
    pub locator: String,
}

/// Trait for host content systems
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Content types eligible for indexing. Re-read on every use.
    async fn indexable_types(&self) -> Result<BTreeSet<String>>;

    /// Every indexable id of the given types, ascending
    async fn list_indexable_ids(&self, types: &BTreeSet<String>) -> Result<Vec<ContentId>>;

    /// Current state of `id`, or `None` if it was removed or is not
    /// published (draft, trash, revision)
    async fn resolve(&self, id: ContentId) -> Result<Option<ContentItem>>;

    /// Current locator of `id`
    async fn resolve_locator(&self, id: ContentId) -> Result<Option<String>> {
        Ok(self.resolve(id).await?.map(|item| item.locator))
    }
}
