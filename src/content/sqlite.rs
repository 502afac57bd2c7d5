//! Content source reading a host SQLite table
//!
//! Expected shape:
//!
//! ```sql
//! CREATE TABLE content (
//!     id INTEGER PRIMARY KEY,
//!     content_type TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     locator TEXT
//! );
//! ```

use super::{ContentId, ContentItem, ContentSource};
use crate::config::{Config, ContentConfig};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(FromRow)]
struct ContentRow {
    content_type: String,
    status: String,
    locator: Option<String>,
}

/// Content source over a host SQLite database
#[derive(Clone)]
pub struct SqliteContentSource {
    pool: SqlitePool,
    table: String,
    indexable_types: BTreeSet<String>,
    excluded_statuses: Vec<String>,
}

impl SqliteContentSource {
    /// Open the host database named by the config.
    ///
    /// The pool connects lazily, so commands that never touch content do not
    /// require the host database to exist.
    pub fn connect(config: &Config) -> Self {
        Self::open(&config.content_db_path(), &config.content)
    }

    pub fn open(db_path: &Path, config: &ContentConfig) -> Self {
        debug!("Opening content database at {:?}", db_path);

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_lazy_with(options);

        Self {
            pool,
            table: config.table.clone(),
            indexable_types: config.indexable_types.iter().cloned().collect(),
            excluded_statuses: config.excluded_statuses.clone(),
        }
    }

    fn is_excluded(&self, status: &str) -> bool {
        self.excluded_statuses.iter().any(|s| s == status)
    }
}

#[async_trait]
impl ContentSource for SqliteContentSource {
    async fn indexable_types(&self) -> Result<BTreeSet<String>> {
        Ok(self.indexable_types.clone())
    }

    async fn list_indexable_ids(&self, types: &BTreeSet<String>) -> Result<Vec<ContentId>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = |n: usize| vec!["?"; n].join(",");
        let mut query = format!(
            "SELECT id FROM {} WHERE content_type IN ({}) AND locator IS NOT NULL",
            self.table,
            placeholders(types.len())
        );
        if !self.excluded_statuses.is_empty() {
            query.push_str(&format!(
                " AND status NOT IN ({})",
                placeholders(self.excluded_statuses.len())
            ));
        }
        query.push_str(" ORDER BY id");

        let mut query_builder = sqlx::query_scalar::<_, i64>(&query);
        for content_type in types {
            query_builder = query_builder.bind(content_type);
        }
        for status in &self.excluded_statuses {
            query_builder = query_builder.bind(status);
        }

        let ids = query_builder.fetch_all(&self.pool).await?;
        Ok(ids
            .into_iter()
            .filter_map(|raw| ContentId::new(raw).ok())
            .collect())
    }

    async fn resolve(&self, id: ContentId) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT content_type, status, locator FROM {} WHERE id = ?",
            self.table
        );
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        if self.is_excluded(&row.status) {
            debug!(id = %id, status = %row.status, "Content is not published");
            return Ok(None);
        }

        Ok(row
            .locator
            .filter(|locator| !locator.is_empty())
            .map(|locator| ContentItem {
                id,
                content_type: row.content_type,
                locator,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(raw: i64) -> ContentId {
        ContentId::new(raw).unwrap()
    }

    async fn setup_content_db(tmp: &TempDir) -> std::path::PathBuf {
        let path = tmp.path().join("content.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE content (
                id INTEGER PRIMARY KEY,
                content_type TEXT NOT NULL,
                status TEXT NOT NULL,
                locator TEXT
            );
            INSERT INTO content VALUES
                (4, 'post', 'publish', 'https://site.test/d'),
                (1, 'post', 'publish', 'https://site.test/a'),
                (2, 'page', 'trash', 'https://site.test/b'),
                (3, 'attachment', 'publish', 'https://site.test/c.png'),
                (5, 'page', 'publish', 'https://site.test/e'),
                (6, 'post', 'publish', NULL);
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        path
    }

    #[tokio::test]
    async fn test_lists_indexable_ids() {
        let tmp = TempDir::new().unwrap();
        let path = setup_content_db(&tmp).await;
        let source = SqliteContentSource::open(&path, &ContentConfig::default());

        let types = source.indexable_types().await.unwrap();
        let ids = source.list_indexable_ids(&types).await.unwrap();
        assert_eq!(ids, vec![id(1), id(4), id(5)]);
    }

    #[tokio::test]
    async fn test_resolve_respects_status() {
        let tmp = TempDir::new().unwrap();
        let path = setup_content_db(&tmp).await;
        let source = SqliteContentSource::open(&path, &ContentConfig::default());

        let item = source.resolve(id(1)).await.unwrap().unwrap();
        assert_eq!(item.content_type, "post");
        assert_eq!(item.locator, "https://site.test/a");

        assert!(source.resolve(id(2)).await.unwrap().is_none());
        assert!(source.resolve(id(6)).await.unwrap().is_none());
        assert!(source.resolve(id(99)).await.unwrap().is_none());

        // Type filtering is the caller's job
        let item = source.resolve(id(3)).await.unwrap().unwrap();
        assert_eq!(item.content_type, "attachment");
    }

    #[tokio::test]
    async fn test_missing_database_fails_on_use() {
        let tmp = TempDir::new().unwrap();
        let source =
            SqliteContentSource::open(&tmp.path().join("absent.db"), &ContentConfig::default());

        assert!(source.resolve(id(1)).await.is_err());
    }
}
