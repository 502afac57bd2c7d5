//! Active and shadow index tables

use super::schema::{index_table_sql, retired_table_name, shadow_table_name};
use super::Database;
use crate::config::IndexConfig;
use crate::content::ContentId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, Executor, FromRow, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

/// Hex digest stored in the `locator_hash` column
pub fn locator_hash(locator: &str) -> String {
    blake3::hash(locator.as_bytes()).to_hex().to_string()
}

/// One row of the index
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: i64,
    pub locator: String,
    pub locator_hash: String,
}

/// Which generation of the index a write targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTable {
    Active,
    Shadow,
}

/// Index table handle
#[derive(Clone)]
pub struct IndexStore {
    db: Database,
    active: String,
    shadow: String,
    retired: String,
    max_locator_len: usize,
}

impl IndexStore {
    pub fn new(db: &Database, config: &IndexConfig) -> Self {
        Self {
            db: db.clone(),
            active: config.table.clone(),
            shadow: shadow_table_name(&config.table),
            retired: retired_table_name(&config.table),
            max_locator_len: config.max_locator_len,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Name of the table backing `target`
    pub fn table(&self, target: IndexTable) -> &str {
        match target {
            IndexTable::Active => &self.active,
            IndexTable::Shadow => &self.shadow,
        }
    }

    /// Create the active table if it does not exist
    pub async fn init_schema(&self) -> Result<()> {
        debug!(table = %self.active, "Initializing index schema");
        let sql = index_table_sql(&self.active);
        sqlx::query(&sql).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Reject locators the table cannot hold
    pub fn validate_locator(&self, locator: &str) -> Result<()> {
        if locator.is_empty() {
            return Err(Error::InvalidLocator("locator is empty".to_string()));
        }
        if locator.len() > self.max_locator_len {
            return Err(Error::InvalidLocator(format!(
                "locator is {} bytes, limit is {}",
                locator.len(),
                self.max_locator_len
            )));
        }
        Ok(())
    }

    // ===== Writes =====

    /// Insert or replace the active record for `id`
    pub async fn upsert(&self, id: ContentId, locator: &str) -> Result<IndexRecord> {
        self.upsert_into(IndexTable::Active, id, locator).await
    }

    /// Insert or replace the record for `id` in the given generation
    pub async fn upsert_into(
        &self,
        target: IndexTable,
        id: ContentId,
        locator: &str,
    ) -> Result<IndexRecord> {
        let mut conn = self.db.pool().acquire().await?;
        self.upsert_in(&mut conn, target, id, locator).await
    }

    /// Upsert on an existing connection or transaction.
    ///
    /// A different id already holding the same hash is evicted: the incoming
    /// write wins. Runs inside its own savepoint, so a failure leaves no half
    /// applied record even when the caller keeps its transaction going.
    pub async fn upsert_in(
        &self,
        conn: &mut SqliteConnection,
        target: IndexTable,
        id: ContentId,
        locator: &str,
    ) -> Result<IndexRecord> {
        self.validate_locator(locator)?;

        let table = self.table(target);
        let hash = locator_hash(locator);
        let mut tx = conn.begin().await?;

        let evict = format!("DELETE FROM {table} WHERE locator_hash = ? AND id <> ? RETURNING id");
        let displaced: Vec<i64> = sqlx::query_scalar(&evict)
            .bind(&hash)
            .bind(id.get())
            .fetch_all(&mut *tx)
            .await?;

        for other in displaced {
            warn!(
                id = %id,
                displaced = other,
                locator = %locator,
                table = %table,
                "Locator hash already owned by another id; last write wins"
            );
        }

        let upsert = format!(
            r#"
            INSERT INTO {table} (id, locator, locator_hash)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                locator = excluded.locator,
                locator_hash = excluded.locator_hash
            "#
        );
        sqlx::query(&upsert)
            .bind(id.get())
            .bind(locator)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(IndexRecord {
            id: id.get(),
            locator: locator.to_string(),
            locator_hash: hash,
        })
    }

    /// Delete the active record for `id`. Returns whether a row was removed.
    pub async fn delete(&self, id: ContentId) -> Result<bool> {
        self.delete_from(IndexTable::Active, id).await
    }

    /// Delete the record for `id` from the given generation
    pub async fn delete_from(&self, target: IndexTable, id: ContentId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table(target));
        let result = sqlx::query(&sql)
            .bind(id.get())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===== Reads =====

    /// Get the active record for `id`
    pub async fn get(&self, id: ContentId) -> Result<Option<IndexRecord>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.active);
        let record = sqlx::query_as::<_, IndexRecord>(&sql)
            .bind(id.get())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    /// Reverse lookup: which id owns this locator
    pub async fn find_by_locator(&self, locator: &str) -> Result<Option<IndexRecord>> {
        self.find_by_hash(&locator_hash(locator)).await
    }

    /// Get the active record holding `hash`
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<IndexRecord>> {
        let sql = format!("SELECT * FROM {} WHERE locator_hash = ?", self.active);
        let record = sqlx::query_as::<_, IndexRecord>(&sql)
            .bind(hash)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    /// Number of active records
    pub async fn count(&self) -> Result<u64> {
        self.count_in(IndexTable::Active).await
    }

    /// Number of records in the given generation
    pub async fn count_in(&self, target: IndexTable) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table(target));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.db.pool()).await?;
        Ok(count as u64)
    }

    /// Page through active records in id order
    pub async fn list(&self, offset: u64, limit: u64) -> Result<Vec<IndexRecord>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY id LIMIT ? OFFSET ?",
            self.active
        );
        let records = sqlx::query_as::<_, IndexRecord>(&sql)
            .bind(limit.min(i64::MAX as u64) as i64)
            .bind(offset.min(i64::MAX as u64) as i64)
            .fetch_all(self.db.pool())
            .await?;
        Ok(records)
    }

    // ===== Shadow generation =====

    /// Replace any leftover shadow table with an empty one
    pub async fn create_shadow_in(&self, conn: &mut SqliteConnection) -> Result<()> {
        let drop = format!("DROP TABLE IF EXISTS {}", self.shadow);
        sqlx::query(&drop).execute(&mut *conn).await?;
        let create = index_table_sql(&self.shadow);
        sqlx::query(&create).execute(&mut *conn).await?;
        debug!(table = %self.shadow, "Created shadow index");
        Ok(())
    }

    pub async fn shadow_exists(&self) -> Result<bool> {
        table_exists(self.db.pool(), &self.shadow).await
    }

    /// Discard the shadow table, if any
    pub async fn drop_shadow(&self) -> Result<()> {
        let mut conn = self.db.pool().acquire().await?;
        self.drop_shadow_in(&mut conn).await
    }

    /// Discard the shadow table on an existing connection or transaction
    pub async fn drop_shadow_in(&self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.shadow);
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// Rename the shadow into place and drop the previous generation.
    ///
    /// Must run inside a transaction: until the caller commits, other
    /// connections keep seeing the old table. Every failure is reported as
    /// [`Error::SwapFailure`].
    pub async fn swap_in(&self, conn: &mut SqliteConnection) -> Result<()> {
        if !table_exists(&mut *conn, &self.shadow).await? {
            return Err(Error::SwapFailure(format!(
                "shadow table {} does not exist",
                self.shadow
            )));
        }

        let steps = [
            format!("ALTER TABLE {} RENAME TO {}", self.active, self.retired),
            format!("ALTER TABLE {} RENAME TO {}", self.shadow, self.active),
            format!("DROP TABLE {}", self.retired),
        ];

        for sql in &steps {
            sqlx::query(sql)
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::SwapFailure(format!("{}: {}", sql, e)))?;
        }

        Ok(())
    }

    /// Swap the shadow into place in a transaction of its own
    pub async fn swap(&self) -> Result<()> {
        let mut tx = self.db.begin().await?;
        self.swap_in(&mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| Error::SwapFailure(e.to_string()))?;
        info!(table = %self.active, "Swapped shadow index into place");
        Ok(())
    }
}

async fn table_exists<'e, E>(executor: E, name: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(executor)
            .await?;
    Ok(count > 0)
}
