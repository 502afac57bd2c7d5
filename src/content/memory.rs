//! In-memory content source

use super::{ContentId, ContentItem, ContentSource};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct Entry {
    content_type: String,
    locator: String,
    published: bool,
}

/// Content source backed by a map, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    items: RwLock<BTreeMap<ContentId, Entry>>,
    types: RwLock<BTreeSet<String>>,
}

impl MemoryContentSource {
    pub fn new<I, S>(indexable_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: RwLock::default(),
            types: RwLock::new(indexable_types.into_iter().map(Into::into).collect()),
        }
    }

    /// Add or replace a published item
    pub fn insert(&self, id: ContentId, content_type: &str, locator: &str) {
        self.items_mut().insert(
            id,
            Entry {
                content_type: content_type.to_string(),
                locator: locator.to_string(),
                published: true,
            },
        );
    }

    /// Keep the item but stop resolving it (draft, trash)
    pub fn unpublish(&self, id: ContentId) {
        if let Some(entry) = self.items_mut().get_mut(&id) {
            entry.published = false;
        }
    }

    pub fn remove(&self, id: ContentId) {
        self.items_mut().remove(&id);
    }

    pub fn set_indexable_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.types.write().unwrap_or_else(|e| e.into_inner()) =
            types.into_iter().map(Into::into).collect();
    }

    fn items(&self) -> RwLockReadGuard<'_, BTreeMap<ContentId, Entry>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn items_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<ContentId, Entry>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn indexable_types(&self) -> Result<BTreeSet<String>> {
        Ok(self.types.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn list_indexable_ids(&self, types: &BTreeSet<String>) -> Result<Vec<ContentId>> {
        Ok(self
            .items()
            .iter()
            .filter(|(_, entry)| entry.published && types.contains(&entry.content_type))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn resolve(&self, id: ContentId) -> Result<Option<ContentItem>> {
        Ok(self
            .items()
            .get(&id)
            .filter(|entry| entry.published)
            .map(|entry| ContentItem {
                id,
                content_type: entry.content_type.clone(),
                locator: entry.locator.clone(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> ContentId {
        ContentId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_lists_published_indexable_in_order() {
        let source = MemoryContentSource::new(["post"]);
        source.insert(id(3), "post", "/c");
        source.insert(id(1), "post", "/a");
        source.insert(id(2), "attachment", "/b");
        source.insert(id(4), "post", "/d");
        source.unpublish(id(4));

        let types = source.indexable_types().await.unwrap();
        let ids = source.list_indexable_ids(&types).await.unwrap();
        assert_eq!(ids, vec![id(1), id(3)]);
    }

    #[tokio::test]
    async fn test_resolve() {
        let source = MemoryContentSource::new(["post"]);
        source.insert(id(1), "post", "/a");

        assert_eq!(
            source.resolve_locator(id(1)).await.unwrap().as_deref(),
            Some("/a")
        );

        source.unpublish(id(1));
        assert!(source.resolve(id(1)).await.unwrap().is_none());

        source.remove(id(1));
        assert!(source.resolve(id(1)).await.unwrap().is_none());
    }
}
